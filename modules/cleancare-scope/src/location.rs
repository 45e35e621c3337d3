//! Dual-location consistency for complaints.
//!
//! A complaint carries the reporter's home location and the incident
//! location. The incident location drives all scope filtering; it defaults to
//! the reporter location when unset and, once explicitly set, is never
//! silently overwritten by a backfill pass.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use cleancare_common::{CleanCareError, Complaint, GeoChain};

use crate::cache::GeoCache;
use crate::traits::ComplaintStore;

/// Mapping from a legacy thana name to its replacement zone/ward chain.
/// Provided by platform administration as migration configuration.
pub type ThanaMap = HashMap<String, GeoChain>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub written: u64,
    pub skipped: u64,
}

pub struct LocationFieldSync {
    geo: Arc<GeoCache>,
}

impl LocationFieldSync {
    pub fn new(geo: Arc<GeoCache>) -> Self {
        Self { geo }
    }

    /// Default the incident location from the reporter profile.
    ///
    /// Copies only when all three incident fields are unset; if *any* is
    /// already set the complaint is left untouched — partial incident data is
    /// never mixed with partial reporter data. Returns true if a copy
    /// happened.
    pub fn derive_incident_location(&self, complaint: &mut Complaint) -> bool {
        if complaint.has_incident_data() {
            return false;
        }
        let Some(reporter) = complaint.reporter.clone() else {
            return false;
        };
        complaint.set_incident(reporter);
        true
    }

    /// Explicitly relocate a complaint's incident (the problem is not where
    /// the reporter lives). The chain is validated against the current tree
    /// before anything is written.
    pub fn set_incident_location(
        &self,
        complaint: &mut Complaint,
        chain: GeoChain,
    ) -> Result<(), CleanCareError> {
        self.geo.snapshot().validate_chain(
            chain.ward_id,
            chain.zone_id,
            &chain.city_corporation_code,
        )?;
        complaint.set_incident(chain);
        Ok(())
    }

    /// Populate missing incident locations from reporter profiles across the
    /// stored complaint set.
    ///
    /// Idempotent: the store only writes rows whose three incident fields are
    /// simultaneously null, so a second run over the same set writes nothing.
    pub async fn backfill(
        &self,
        store: &dyn ComplaintStore,
    ) -> Result<BackfillReport, CleanCareError> {
        let mut report = BackfillReport::default();

        for complaint in store.list_all().await? {
            if complaint.has_incident_data() {
                report.skipped += 1;
                continue;
            }
            let Some(reporter) = complaint.reporter.clone() else {
                report.skipped += 1;
                continue;
            };
            if store.set_incident_if_absent(complaint.id, &reporter).await? {
                report.written += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            written = report.written,
            skipped = report.skipped,
            "Incident location backfill complete"
        );
        Ok(report)
    }

    /// One-time replacement of the legacy thana layer: resolve each
    /// complaint's `legacy_thana` through the mapping and fill the missing
    /// reporter chain. Thana itself stays readable and is never written.
    ///
    /// The whole mapping is validated against the current tree up front — a
    /// single inconsistent entry rejects the run before any write.
    pub async fn backfill_thana(
        &self,
        store: &dyn ComplaintStore,
        thana_map: &ThanaMap,
    ) -> Result<BackfillReport, CleanCareError> {
        let tree = self.geo.snapshot();
        for (thana, chain) in thana_map {
            tree.validate_chain(chain.ward_id, chain.zone_id, &chain.city_corporation_code)
                .map_err(|e| {
                    CleanCareError::InvalidGeography(format!(
                        "thana mapping for {thana:?} is inconsistent: {e}"
                    ))
                })?;
        }

        let mut report = BackfillReport::default();
        for complaint in store.list_all().await? {
            if complaint.reporter.is_some() {
                report.skipped += 1;
                continue;
            }
            let Some(thana) = complaint.legacy_thana.as_deref() else {
                report.skipped += 1;
                continue;
            };
            let Some(chain) = thana_map.get(thana) else {
                warn!(
                    complaint_id = %complaint.id,
                    thana,
                    "No zone/ward mapping for legacy thana; leaving row untouched"
                );
                report.skipped += 1;
                continue;
            };
            if store.set_reporter_if_absent(complaint.id, chain).await? {
                report.written += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            written = report.written,
            skipped = report.skipped,
            "Thana backfill complete"
        );
        Ok(report)
    }
}

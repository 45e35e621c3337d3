//! From staff identity to the exact set of geographic units they may act on.
//!
//! The resolver is fail-closed: a staff identity with no valid assignment for
//! its role gets an empty predicate, never an implicit "everything".

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use cleancare_common::{
    CleanCareError, Complaint, GeoChain, StaffAssignment, StaffIdentity,
};

use crate::cache::GeoCache;
use crate::geo::GeoTree;
use crate::traits::AssignmentStore;

/// Structural description of the geographic units a staff identity may act
/// on. A complaint is in scope iff its incident location matches *any one* of
/// the three sets at the appropriate level — different roles populate
/// different fields, so matching is OR, never AND.
///
/// City-corporation coverage is not materialized into zone/ward sets; it is
/// expanded through the geo tree at query time, which is what makes a
/// city-level scope automatically include newly created zones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePredicate {
    pub city_corporation_codes: BTreeSet<String>,
    pub zone_ids: BTreeSet<Uuid>,
    pub ward_ids: BTreeSet<Uuid>,
}

impl ScopePredicate {
    /// The predicate that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.city_corporation_codes.is_empty()
            && self.zone_ids.is_empty()
            && self.ward_ids.is_empty()
    }

    /// OR-match an incident location against the three levels.
    pub fn matches(&self, incident: &GeoChain) -> bool {
        self.ward_ids.contains(&incident.ward_id)
            || self.zone_ids.contains(&incident.zone_id)
            || self
                .city_corporation_codes
                .contains(&incident.city_corporation_code)
    }

    /// Whether a complaint's incident location is in scope. A complaint
    /// without a complete incident chain matches nothing (fail closed).
    pub fn covers_complaint(&self, complaint: &Complaint) -> bool {
        complaint
            .incident_chain()
            .is_some_and(|chain| self.matches(&chain))
    }

    /// Every zone this predicate reaches, expanding city-corporation codes
    /// through the current tree.
    pub fn covered_zones(&self, tree: &GeoTree) -> BTreeSet<Uuid> {
        let mut zones = self.zone_ids.clone();
        for code in &self.city_corporation_codes {
            zones.extend(tree.zones_under(code));
        }
        zones
    }

    /// Every ward this predicate reaches, expanding zones and corporations
    /// through the current tree.
    pub fn covered_wards(&self, tree: &GeoTree) -> BTreeSet<Uuid> {
        let mut wards = self.ward_ids.clone();
        for zone_id in self.covered_zones(tree) {
            wards.extend(tree.wards_under(zone_id));
        }
        wards
    }
}

/// Per-staff predicate cache keyed by assignment version.
///
/// An assignment mutation bumps the staff's version, which makes the cached
/// entry unreachable in the same instant the mutation commits — invalidation
/// is synchronous with the write, with no TTL sweep involved.
#[derive(Default)]
pub struct ScopeCache {
    entries: RwLock<HashMap<Uuid, (u64, ScopePredicate)>>,
}

impl ScopeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, staff_id: Uuid, version: u64) -> Option<ScopePredicate> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(&staff_id)
            .filter(|(cached_version, _)| *cached_version == version)
            .map(|(_, predicate)| predicate.clone())
    }

    fn put(&self, staff_id: Uuid, version: u64, predicate: ScopePredicate) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(staff_id, (version, predicate));
    }

    pub fn invalidate(&self, staff_id: Uuid) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(&staff_id);
    }
}

pub struct ScopeResolver {
    geo: Arc<GeoCache>,
    assignments: Arc<dyn AssignmentStore>,
    cache: ScopeCache,
}

impl ScopeResolver {
    pub fn new(geo: Arc<GeoCache>, assignments: Arc<dyn AssignmentStore>) -> Self {
        Self {
            geo,
            assignments,
            cache: ScopeCache::new(),
        }
    }

    /// Resolve a staff identity to its scope predicate.
    ///
    /// Reads the staff's current assignment version first, so a cached
    /// predicate is only served while no mutation has landed since it was
    /// computed.
    pub async fn resolve(&self, staff: &StaffIdentity) -> Result<ScopePredicate, CleanCareError> {
        let version = self.assignments.version(staff.id).await?;
        if let Some(predicate) = self.cache.get(staff.id, version) {
            return Ok(predicate);
        }

        // Assignments that reference geography the tree no longer knows mean
        // the assignment relation and the geo tree have drifted. Surface that
        // instead of quietly resolving around it.
        let tree = self.geo.snapshot();
        let predicate = match self.assignments.snapshot(staff).await? {
            StaffAssignment::Ward { ward_id } => {
                if tree.ward(ward_id).is_none() {
                    return Err(CleanCareError::ReferentialIntegrity(format!(
                        "staff {} is assigned to missing ward {ward_id}",
                        staff.id
                    )));
                }
                ScopePredicate {
                    ward_ids: BTreeSet::from([ward_id]),
                    ..Default::default()
                }
            }
            StaffAssignment::Zones { zone_ids } => {
                if let Some(missing) = zone_ids.iter().find(|z| tree.zone(**z).is_none()) {
                    return Err(CleanCareError::ReferentialIntegrity(format!(
                        "staff {} is assigned to missing zone {missing}",
                        staff.id
                    )));
                }
                ScopePredicate {
                    zone_ids,
                    ..Default::default()
                }
            }
            StaffAssignment::City {
                city_corporation_code,
            } => {
                if tree.city_corporation(&city_corporation_code).is_none() {
                    return Err(CleanCareError::ReferentialIntegrity(format!(
                        "staff {} is assigned to missing city corporation {city_corporation_code}",
                        staff.id
                    )));
                }
                ScopePredicate {
                    city_corporation_codes: BTreeSet::from([city_corporation_code]),
                    ..Default::default()
                }
            }
            StaffAssignment::Unscoped => {
                warn!(
                    staff_id = %staff.id,
                    role = %staff.role,
                    "Staff has no assignment for role; resolving to empty scope"
                );
                ScopePredicate::empty()
            }
        };

        self.cache.put(staff.id, version, predicate.clone());
        Ok(predicate)
    }

    /// Zones reachable by a staff identity under the current tree.
    pub async fn covered_zones(
        &self,
        staff: &StaffIdentity,
    ) -> Result<BTreeSet<Uuid>, CleanCareError> {
        let predicate = self.resolve(staff).await?;
        Ok(predicate.covered_zones(&self.geo.snapshot()))
    }

    /// Wards reachable by a staff identity under the current tree.
    pub async fn covered_wards(
        &self,
        staff: &StaffIdentity,
    ) -> Result<BTreeSet<Uuid>, CleanCareError> {
        let predicate = self.resolve(staff).await?;
        Ok(predicate.covered_wards(&self.geo.snapshot()))
    }

    /// Drop the cached predicate for one staff identity.
    pub fn invalidate(&self, staff_id: Uuid) {
        self.cache.invalidate(staff_id);
    }

    pub fn geo(&self) -> &Arc<GeoCache> {
        &self.geo
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Geography ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GeoStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for GeoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoStatus::Active => write!(f, "active"),
            GeoStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// Root of the administrative hierarchy. Identified by a stable code ("DSCC").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityCorporation {
    pub code: String,
    pub name: String,
    /// Valid ward-number range for every ward reported under this corporation.
    pub min_ward: u32,
    pub max_ward: u32,
    pub status: GeoStatus,
}

/// Subdivision of a CityCorporation. `zone_number` is unique per corporation,
/// not globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub zone_number: u32,
    pub city_corporation_code: String,
    pub officer_name: Option<String>,
    pub officer_contact: Option<String>,
    pub status: GeoStatus,
}

/// Subdivision of a Zone. There is no direct Ward -> CityCorporation pointer;
/// the corporation is always derived transitively through the owning zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ward {
    pub id: Uuid,
    pub ward_number: u32,
    pub zone_id: Uuid,
    pub inspector_name: Option<String>,
    pub inspector_contact: Option<String>,
    pub status: GeoStatus,
}

/// A fully-specified ward/zone/corporation chain. Used for both the reporter
/// profile location and a complete incident location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoChain {
    pub city_corporation_code: String,
    pub zone_id: Uuid,
    pub ward_id: Uuid,
}

// --- Staff ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    WardAdmin,
    ZoneAdmin,
    CityAdmin,
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaffRole::WardAdmin => write!(f, "ward_admin"),
            StaffRole::ZoneAdmin => write!(f, "zone_admin"),
            StaffRole::CityAdmin => write!(f, "city_admin"),
        }
    }
}

/// Snapshot of a staff member as handed over by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffIdentity {
    pub id: Uuid,
    pub role: StaffRole,
}

/// What a staff identity is currently assigned to, as a closed sum.
///
/// `Unscoped` is a valid terminal state (role set, nothing assigned) and must
/// resolve to an empty scope — never to an implicit full scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StaffAssignment {
    Ward { ward_id: Uuid },
    Zones { zone_ids: BTreeSet<Uuid> },
    City { city_corporation_code: String },
    Unscoped,
}

/// A single zone grant to a zone-level staff identity. `(staff_id, zone_id)`
/// is unique together. `assigned_by` goes null if the assigner is removed;
/// the assignment itself survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAssignment {
    pub staff_id: Uuid,
    pub zone_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<Uuid>,
}

/// Result of an idempotent zone grant. `AlreadyAssigned` is a benign no-op,
/// not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    AlreadyAssigned,
}

/// Result of an idempotent zone revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnassignOutcome {
    Removed,
    NotAssigned,
}

// --- Complaints ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Pending,
    InProgress,
    Resolved,
    Rejected,
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplaintStatus::Pending => write!(f, "pending"),
            ComplaintStatus::InProgress => write!(f, "in_progress"),
            ComplaintStatus::Resolved => write!(f, "resolved"),
            ComplaintStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A citizen complaint, carrying two independently-meaningful locations.
///
/// `reporter` answers "where does the reporter live" and is copied from the
/// submitting account at creation time. Legacy rows migrated from the Thana
/// era may not have it. The three `incident_*` fields answer "where is the
/// problem" and drive all scope filtering. They default to the reporter
/// location when left unset, and once explicitly set are never silently
/// overwritten by a backfill pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complaint {
    pub id: Uuid,
    pub reporter_user_id: Uuid,
    pub title: String,
    pub status: ComplaintStatus,
    pub reporter: Option<GeoChain>,
    pub incident_city_corporation_code: Option<String>,
    pub incident_zone_id: Option<Uuid>,
    pub incident_ward_id: Option<Uuid>,
    /// Pre-migration administrative unit. Readable for historical complaints,
    /// never a write target for new scope decisions.
    pub legacy_thana: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Complaint {
    /// The incident location as a complete chain, if all three fields are set.
    pub fn incident_chain(&self) -> Option<GeoChain> {
        match (
            &self.incident_city_corporation_code,
            self.incident_zone_id,
            self.incident_ward_id,
        ) {
            (Some(code), Some(zone_id), Some(ward_id)) => Some(GeoChain {
                city_corporation_code: code.clone(),
                zone_id,
                ward_id,
            }),
            _ => None,
        }
    }

    /// True if any of the three incident fields carries a value.
    pub fn has_incident_data(&self) -> bool {
        self.incident_city_corporation_code.is_some()
            || self.incident_zone_id.is_some()
            || self.incident_ward_id.is_some()
    }

    pub fn set_incident(&mut self, chain: GeoChain) {
        self.incident_city_corporation_code = Some(chain.city_corporation_code);
        self.incident_zone_id = Some(chain.zone_id);
        self.incident_ward_id = Some(chain.ward_id);
    }
}

// --- Notifications ---

/// A per-staff notification about a complaint event. Unread notifications are
/// removed during reconciliation when the recipient's scope no longer covers
/// the complaint; read ones are historical record and stay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_staff_id: Uuid,
    pub complaint_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    pub read: bool,
}

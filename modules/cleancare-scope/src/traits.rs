//! Storage trait seams.
//!
//! Implemented by the Postgres stores (cleancare-store) and by the in-memory
//! stores in [`crate::memory`] for tests and single-process deployments.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use cleancare_common::{
    AssignOutcome, AssignmentChanged, CleanCareError, Complaint, GeoChain, Notification,
    StaffAssignment, StaffIdentity, UnassignOutcome,
};

/// The staff-to-geography assignment relation.
///
/// Every effective mutation is transactional and emits [`AssignmentChanged`]
/// as part of the same atomic unit: a change is never observable as stored
/// before it is visible to reconciliation. Idempotent no-ops emit nothing.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Grant a zone to a zone-level staff identity. Granting an
    /// already-granted zone is a no-op success.
    async fn assign_zone(
        &self,
        staff_id: Uuid,
        zone_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<AssignOutcome, CleanCareError>;

    /// Revoke a zone grant. Revoking an absent grant is a no-op success.
    async fn unassign_zone(
        &self,
        staff_id: Uuid,
        zone_id: Uuid,
    ) -> Result<UnassignOutcome, CleanCareError>;

    async fn assigned_zones(&self, staff_id: Uuid) -> Result<BTreeSet<Uuid>, CleanCareError>;

    /// Replace the single ward assignment atomically.
    async fn set_ward_assignment(
        &self,
        staff_id: Uuid,
        ward_id: Uuid,
    ) -> Result<(), CleanCareError>;

    /// Replace the single city-corporation assignment atomically.
    async fn set_city_assignment(
        &self,
        staff_id: Uuid,
        city_corporation_code: &str,
    ) -> Result<(), CleanCareError>;

    /// The assignment relevant to the staff's role, as a closed sum.
    async fn snapshot(&self, staff: &StaffIdentity) -> Result<StaffAssignment, CleanCareError>;

    /// Per-staff monotonically increasing mutation counter. 0 = never mutated.
    async fn version(&self, staff_id: Uuid) -> Result<u64, CleanCareError>;

    /// Subscribe to assignment-change events.
    fn subscribe(&self) -> broadcast::Receiver<AssignmentChanged>;
}

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Complaint>, CleanCareError>;

    async fn list_all(&self) -> Result<Vec<Complaint>, CleanCareError>;

    async fn insert(&self, complaint: &Complaint) -> Result<(), CleanCareError>;

    /// Write the incident chain only if all three incident fields are
    /// currently unset. Returns true if a write happened. This guard is what
    /// makes the backfill idempotent and non-destructive.
    async fn set_incident_if_absent(
        &self,
        id: Uuid,
        chain: &GeoChain,
    ) -> Result<bool, CleanCareError>;

    /// Write the reporter chain only if currently unset (legacy thana rows).
    /// Returns true if a write happened.
    async fn set_reporter_if_absent(
        &self,
        id: Uuid,
        chain: &GeoChain,
    ) -> Result<bool, CleanCareError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), CleanCareError>;

    /// Unread notifications for a staff member, oldest first.
    async fn unread_for(&self, staff_id: Uuid) -> Result<Vec<Notification>, CleanCareError>;

    /// Returns true if the notification existed and was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, CleanCareError>;

    /// Returns true if the notification existed.
    async fn mark_read(&self, id: Uuid) -> Result<bool, CleanCareError>;
}

/// Lookup of staff identity snapshots (role + id) by id.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    async fn get(&self, staff_id: Uuid) -> Result<Option<StaffIdentity>, CleanCareError>;
}

//! In-memory store implementations. Used by tests and by single-process
//! deployments that load state at startup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

use cleancare_common::{
    AssignOutcome, AssignmentChanged, CleanCareError, Complaint, GeoChain, Notification,
    StaffAssignment, StaffIdentity, StaffRole, UnassignOutcome, ZoneAssignment,
};

use crate::cache::GeoCache;
use crate::traits::{AssignmentStore, ComplaintStore, NotificationStore, StaffDirectory};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Assignments
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AssignState {
    zone_grants: HashMap<Uuid, BTreeMap<Uuid, ZoneAssignment>>,
    ward_assignments: HashMap<Uuid, Uuid>,
    city_assignments: HashMap<Uuid, String>,
    versions: HashMap<Uuid, u64>,
}

impl AssignState {
    /// Bump the staff version and build the event. Called with the state lock
    /// held, so the mutation and the event are one atomic unit.
    fn bump(&mut self, staff_id: Uuid) -> AssignmentChanged {
        let version = self.versions.entry(staff_id).or_insert(0);
        *version += 1;
        AssignmentChanged::new(staff_id, *version)
    }
}

pub struct MemoryAssignmentStore {
    geo: Arc<GeoCache>,
    state: Mutex<AssignState>,
    events: broadcast::Sender<AssignmentChanged>,
}

impl MemoryAssignmentStore {
    pub fn new(geo: Arc<GeoCache>) -> Self {
        Self::with_capacity(geo, 256)
    }

    pub fn with_capacity(geo: Arc<GeoCache>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            geo,
            state: Mutex::new(AssignState::default()),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AssignState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: AssignmentChanged) {
        // Send fails only when no subscriber exists, which is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
    async fn assign_zone(
        &self,
        staff_id: Uuid,
        zone_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<AssignOutcome, CleanCareError> {
        if self.geo.snapshot().zone(zone_id).is_none() {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "cannot assign unknown zone {zone_id}"
            )));
        }

        let mut state = self.lock();
        let grants = state.zone_grants.entry(staff_id).or_default();
        if grants.contains_key(&zone_id) {
            return Ok(AssignOutcome::AlreadyAssigned);
        }

        grants.insert(
            zone_id,
            ZoneAssignment {
                staff_id,
                zone_id,
                assigned_at: Utc::now(),
                assigned_by,
            },
        );
        let event = state.bump(staff_id);
        self.emit(event);
        drop(state);

        info!(staff_id = %staff_id, zone_id = %zone_id, "Zone assigned");
        Ok(AssignOutcome::Assigned)
    }

    async fn unassign_zone(
        &self,
        staff_id: Uuid,
        zone_id: Uuid,
    ) -> Result<UnassignOutcome, CleanCareError> {
        let mut state = self.lock();
        let removed = state
            .zone_grants
            .get_mut(&staff_id)
            .is_some_and(|grants| grants.remove(&zone_id).is_some());

        if !removed {
            return Ok(UnassignOutcome::NotAssigned);
        }

        let event = state.bump(staff_id);
        self.emit(event);
        drop(state);

        info!(staff_id = %staff_id, zone_id = %zone_id, "Zone unassigned");
        Ok(UnassignOutcome::Removed)
    }

    async fn assigned_zones(&self, staff_id: Uuid) -> Result<BTreeSet<Uuid>, CleanCareError> {
        let state = self.lock();
        Ok(state
            .zone_grants
            .get(&staff_id)
            .map(|grants| grants.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn set_ward_assignment(
        &self,
        staff_id: Uuid,
        ward_id: Uuid,
    ) -> Result<(), CleanCareError> {
        if self.geo.snapshot().ward(ward_id).is_none() {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "cannot assign unknown ward {ward_id}"
            )));
        }

        let mut state = self.lock();
        if state.ward_assignments.get(&staff_id) == Some(&ward_id) {
            return Ok(());
        }
        state.ward_assignments.insert(staff_id, ward_id);
        let event = state.bump(staff_id);
        self.emit(event);
        drop(state);

        info!(staff_id = %staff_id, ward_id = %ward_id, "Ward assignment set");
        Ok(())
    }

    async fn set_city_assignment(
        &self,
        staff_id: Uuid,
        city_corporation_code: &str,
    ) -> Result<(), CleanCareError> {
        if self
            .geo
            .snapshot()
            .city_corporation(city_corporation_code)
            .is_none()
        {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "cannot assign unknown city corporation {city_corporation_code}"
            )));
        }

        let mut state = self.lock();
        if state.city_assignments.get(&staff_id).map(String::as_str)
            == Some(city_corporation_code)
        {
            return Ok(());
        }
        state
            .city_assignments
            .insert(staff_id, city_corporation_code.to_string());
        let event = state.bump(staff_id);
        self.emit(event);
        drop(state);

        info!(staff_id = %staff_id, code = city_corporation_code, "City assignment set");
        Ok(())
    }

    async fn snapshot(&self, staff: &StaffIdentity) -> Result<StaffAssignment, CleanCareError> {
        let state = self.lock();
        let assignment = match staff.role {
            StaffRole::WardAdmin => match state.ward_assignments.get(&staff.id) {
                Some(ward_id) => StaffAssignment::Ward { ward_id: *ward_id },
                None => StaffAssignment::Unscoped,
            },
            StaffRole::ZoneAdmin => {
                let zone_ids: BTreeSet<Uuid> = state
                    .zone_grants
                    .get(&staff.id)
                    .map(|grants| grants.keys().copied().collect())
                    .unwrap_or_default();
                if zone_ids.is_empty() {
                    StaffAssignment::Unscoped
                } else {
                    StaffAssignment::Zones { zone_ids }
                }
            }
            StaffRole::CityAdmin => match state.city_assignments.get(&staff.id) {
                Some(code) => StaffAssignment::City {
                    city_corporation_code: code.clone(),
                },
                None => StaffAssignment::Unscoped,
            },
        };
        Ok(assignment)
    }

    async fn version(&self, staff_id: Uuid) -> Result<u64, CleanCareError> {
        Ok(self.lock().versions.get(&staff_id).copied().unwrap_or(0))
    }

    fn subscribe(&self) -> broadcast::Receiver<AssignmentChanged> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Complaints
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryComplaintStore {
    complaints: RwLock<HashMap<Uuid, Complaint>>,
}

impl MemoryComplaintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComplaintStore for MemoryComplaintStore {
    async fn get(&self, id: Uuid) -> Result<Option<Complaint>, CleanCareError> {
        Ok(read(&self.complaints).get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Complaint>, CleanCareError> {
        let mut all: Vec<Complaint> = read(&self.complaints).values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        Ok(all)
    }

    async fn insert(&self, complaint: &Complaint) -> Result<(), CleanCareError> {
        write(&self.complaints).insert(complaint.id, complaint.clone());
        Ok(())
    }

    async fn set_incident_if_absent(
        &self,
        id: Uuid,
        chain: &GeoChain,
    ) -> Result<bool, CleanCareError> {
        let mut complaints = write(&self.complaints);
        let complaint = complaints.get_mut(&id).ok_or_else(|| {
            CleanCareError::ReferentialIntegrity(format!("unknown complaint {id}"))
        })?;

        if complaint.has_incident_data() {
            return Ok(false);
        }
        complaint.set_incident(chain.clone());
        Ok(true)
    }

    async fn set_reporter_if_absent(
        &self,
        id: Uuid,
        chain: &GeoChain,
    ) -> Result<bool, CleanCareError> {
        let mut complaints = write(&self.complaints);
        let complaint = complaints.get_mut(&id).ok_or_else(|| {
            CleanCareError::ReferentialIntegrity(format!("unknown complaint {id}"))
        })?;

        if complaint.reporter.is_some() {
            return Ok(false);
        }
        complaint.reporter = Some(chain.clone());
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryNotificationStore {
    notifications: RwLock<HashMap<Uuid, Notification>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<(), CleanCareError> {
        write(&self.notifications).insert(notification.id, notification.clone());
        Ok(())
    }

    async fn unread_for(&self, staff_id: Uuid) -> Result<Vec<Notification>, CleanCareError> {
        let mut unread: Vec<Notification> = read(&self.notifications)
            .values()
            .filter(|n| n.recipient_staff_id == staff_id && !n.read)
            .cloned()
            .collect();
        unread.sort_by_key(|n| n.created_at);
        Ok(unread)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, CleanCareError> {
        Ok(write(&self.notifications).remove(&id).is_some())
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, CleanCareError> {
        let mut notifications = write(&self.notifications);
        match notifications.get_mut(&id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Staff directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStaffDirectory {
    staff: RwLock<HashMap<Uuid, StaffIdentity>>,
}

impl MemoryStaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, staff: StaffIdentity) {
        write(&self.staff).insert(staff.id, staff);
    }
}

#[async_trait]
impl StaffDirectory for MemoryStaffDirectory {
    async fn get(&self, staff_id: Uuid) -> Result<Option<StaffIdentity>, CleanCareError> {
        Ok(read(&self.staff).get(&staff_id).cloned())
    }
}

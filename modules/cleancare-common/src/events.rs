//! Assignment-change events. Emitted atomically with every effective
//! assignment mutation and consumed by notification reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A staff member's assignment set changed.
///
/// `version` increases monotonically per staff. Reconciliation never acts on
/// assignment state older than the version that triggered it — consumers
/// re-read current state rather than trusting the event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentChanged {
    pub staff_id: Uuid,
    pub version: u64,
    pub changed_at: DateTime<Utc>,
}

impl AssignmentChanged {
    pub fn new(staff_id: Uuid, version: u64) -> Self {
        Self {
            staff_id,
            version,
            changed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_round_trips_through_json() {
        let evt = AssignmentChanged::new(Uuid::new_v4(), 3);
        let json = serde_json::to_string(&evt).unwrap();
        let back: AssignmentChanged = serde_json::from_str(&json).unwrap();
        assert_eq!(evt, back);
    }
}

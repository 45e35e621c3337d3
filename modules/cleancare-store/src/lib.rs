//! Postgres-backed implementations of the storage traits.
//!
//! Mutations are transactional; assignment changes write an event row in the
//! same transaction that mutates the relation, so a change is never stored
//! without being visible to reconciliation.

pub mod assignments;
pub mod complaints;
pub mod geo;
pub mod migrate;
pub mod notifications;
pub mod staff;

pub use assignments::PgAssignmentStore;
pub use complaints::PgComplaintStore;
pub use geo::load_geo_tree;
pub use migrate::migrate;
pub use notifications::PgNotificationStore;
pub use staff::PgStaffDirectory;

use cleancare_common::CleanCareError;

pub(crate) fn db_err(e: sqlx::Error) -> CleanCareError {
    CleanCareError::Database(e.to_string())
}

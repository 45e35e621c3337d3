//! Geographic scope resolution for the complaint platform.
//!
//! Decides which complaints, users, and notifications a staff member may act
//! on, based on the City Corporation -> Zone -> Ward hierarchy and the
//! three-tier staff role model. Fail-closed throughout: an identity with no
//! valid assignment resolves to an empty scope, never to full access.

pub mod cache;
pub mod geo;
pub mod guard;
pub mod location;
pub mod memory;
pub mod resolver;
pub mod traits;

pub use cache::GeoCache;
pub use geo::GeoTree;
pub use guard::{NotificationScopeGuard, ReconcileOutcome};
pub use location::{BackfillReport, LocationFieldSync};
pub use memory::{
    MemoryAssignmentStore, MemoryComplaintStore, MemoryNotificationStore, MemoryStaffDirectory,
};
pub use resolver::{ScopeCache, ScopePredicate, ScopeResolver};
pub use traits::{AssignmentStore, ComplaintStore, NotificationStore, StaffDirectory};

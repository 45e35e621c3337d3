//! Scope filtering for notifications, including reconciliation after
//! assignment changes.
//!
//! Delivery and retention both go through the resolver, so a staff member
//! whose assignment shrank provably loses the unread notifications that fell
//! out of scope. Read notifications are historical record and stay.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use cleancare_common::{AssignmentChanged, CleanCareError, Complaint, Notification, StaffIdentity};

use crate::resolver::ScopeResolver;
use crate::traits::{ComplaintStore, NotificationStore, StaffDirectory};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub removed: u64,
    pub kept: u64,
}

pub struct NotificationScopeGuard {
    resolver: Arc<ScopeResolver>,
    staff: Arc<dyn StaffDirectory>,
    complaints: Arc<dyn ComplaintStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl NotificationScopeGuard {
    pub fn new(
        resolver: Arc<ScopeResolver>,
        staff: Arc<dyn StaffDirectory>,
        complaints: Arc<dyn ComplaintStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            resolver,
            staff,
            complaints,
            notifications,
        }
    }

    /// Whether an outbound notification may be delivered to its recipient.
    /// Unknown recipients fail closed.
    pub async fn should_deliver(
        &self,
        notification: &Notification,
        complaint: &Complaint,
    ) -> Result<bool, CleanCareError> {
        let Some(staff) = self.staff.get(notification.recipient_staff_id).await? else {
            warn!(
                staff_id = %notification.recipient_staff_id,
                "Notification recipient not found; withholding delivery"
            );
            return Ok(false);
        };
        let predicate = self.resolver.resolve(&staff).await?;
        Ok(predicate.covers_complaint(complaint))
    }

    /// Remove the staff member's unread notifications whose complaints are no
    /// longer in scope.
    ///
    /// The predicate is re-resolved immediately before each delete decision
    /// rather than once up front, so a zone granted while the sweep runs is
    /// honored — the sweep never deletes a notification that is valid under
    /// assignment state newer than the triggering change. Each decision is
    /// independent and idempotent; the sweep is safely abortable.
    pub async fn reconcile(&self, staff_id: Uuid) -> Result<ReconcileOutcome, CleanCareError> {
        let staff = self.staff.get(staff_id).await?;
        if staff.is_none() {
            warn!(staff_id = %staff_id, "Reconciling notifications for unknown staff; treating scope as empty");
        }

        let unread = self.notifications.unread_for(staff_id).await?;
        let mut outcome = ReconcileOutcome::default();

        for notification in unread {
            let Some(complaint) = self.complaints.get(notification.complaint_id).await? else {
                return Err(CleanCareError::ReferentialIntegrity(format!(
                    "notification {} references missing complaint {}",
                    notification.id, notification.complaint_id
                )));
            };

            let in_scope = match &staff {
                Some(identity) => self
                    .resolver
                    .resolve(identity)
                    .await?
                    .covers_complaint(&complaint),
                None => false,
            };

            if in_scope {
                outcome.kept += 1;
            } else if self.notifications.delete(notification.id).await? {
                outcome.removed += 1;
            }
        }

        info!(
            staff_id = %staff_id,
            removed = outcome.removed,
            kept = outcome.kept,
            "Notification reconciliation complete"
        );
        Ok(outcome)
    }

    /// Consume assignment-change events and reconcile per staff. A failure
    /// for one staff identity is logged and never aborts reconciliation for
    /// others.
    pub fn spawn_reconcile_loop(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<AssignmentChanged>,
    ) -> JoinHandle<()> {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = guard.reconcile(event.staff_id).await {
                            error!(
                                staff_id = %event.staff_id,
                                error = %e,
                                "Reconciliation failed; continuing with other staff"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // A staff member whose event was dropped is picked up
                        // again on their next assignment change.
                        warn!(skipped, "Assignment event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("Reconcile loop stopped: assignment event stream closed");
        })
    }

    /// Convenience for re-checking a staff member on demand (admin tooling).
    pub async fn reconcile_staff(
        &self,
        staff: &StaffIdentity,
    ) -> Result<ReconcileOutcome, CleanCareError> {
        self.reconcile(staff.id).await
    }
}

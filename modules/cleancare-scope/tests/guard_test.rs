//! Notification scope filtering and reconciliation after assignment changes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use cleancare_common::{
    CityCorporation, CleanCareError, Complaint, ComplaintStatus, GeoChain, GeoStatus,
    Notification, StaffIdentity, StaffRole, Ward, Zone,
};
use cleancare_scope::{
    AssignmentStore, ComplaintStore, GeoCache, MemoryAssignmentStore, MemoryComplaintStore,
    MemoryNotificationStore, MemoryStaffDirectory, NotificationScopeGuard, NotificationStore,
    ScopeResolver, StaffDirectory,
};

struct Fixture {
    assignments: Arc<MemoryAssignmentStore>,
    complaints: Arc<MemoryComplaintStore>,
    notifications: Arc<MemoryNotificationStore>,
    staff_dir: Arc<MemoryStaffDirectory>,
    guard: Arc<NotificationScopeGuard>,
    zone7: Uuid,
    ward71: Uuid,
    zone9: Uuid,
    ward91: Uuid,
}

fn fixture() -> Fixture {
    let geo = Arc::new(GeoCache::empty());
    let zone7 = Uuid::new_v4();
    let zone9 = Uuid::new_v4();
    let ward71 = Uuid::new_v4();
    let ward91 = Uuid::new_v4();

    geo.mutate(|t| {
        t.upsert_city_corporation(CityCorporation {
            code: "DSCC".to_string(),
            name: "Dhaka South".to_string(),
            min_ward: 1,
            max_ward: 75,
            status: GeoStatus::Active,
        })?;
        t.upsert_zone(Zone {
            id: zone7,
            zone_number: 7,
            city_corporation_code: "DSCC".to_string(),
            officer_name: None,
            officer_contact: None,
            status: GeoStatus::Active,
        })?;
        t.upsert_zone(Zone {
            id: zone9,
            zone_number: 9,
            city_corporation_code: "DSCC".to_string(),
            officer_name: None,
            officer_contact: None,
            status: GeoStatus::Active,
        })?;
        t.upsert_ward(Ward {
            id: ward71,
            ward_number: 21,
            zone_id: zone7,
            inspector_name: None,
            inspector_contact: None,
            status: GeoStatus::Active,
        })?;
        t.upsert_ward(Ward {
            id: ward91,
            ward_number: 31,
            zone_id: zone9,
            inspector_name: None,
            inspector_contact: None,
            status: GeoStatus::Active,
        })
    })
    .unwrap();

    let assignments = Arc::new(MemoryAssignmentStore::new(Arc::clone(&geo)));
    let resolver = Arc::new(ScopeResolver::new(
        Arc::clone(&geo),
        Arc::clone(&assignments) as Arc<dyn AssignmentStore>,
    ));
    let complaints = Arc::new(MemoryComplaintStore::new());
    let notifications = Arc::new(MemoryNotificationStore::new());
    let staff_dir = Arc::new(MemoryStaffDirectory::new());

    let guard = Arc::new(NotificationScopeGuard::new(
        resolver,
        Arc::clone(&staff_dir) as Arc<dyn StaffDirectory>,
        Arc::clone(&complaints) as Arc<dyn ComplaintStore>,
        Arc::clone(&notifications) as Arc<dyn NotificationStore>,
    ));

    Fixture {
        assignments,
        complaints,
        notifications,
        staff_dir,
        guard,
        zone7,
        ward71,
        zone9,
        ward91,
    }
}

fn complaint_in(code: &str, zone_id: Uuid, ward_id: Uuid) -> Complaint {
    let chain = GeoChain {
        city_corporation_code: code.to_string(),
        zone_id,
        ward_id,
    };
    Complaint {
        id: Uuid::new_v4(),
        reporter_user_id: Uuid::new_v4(),
        title: "Garbage not collected".to_string(),
        status: ComplaintStatus::Pending,
        reporter: Some(chain.clone()),
        incident_city_corporation_code: Some(chain.city_corporation_code),
        incident_zone_id: Some(chain.zone_id),
        incident_ward_id: Some(chain.ward_id),
        legacy_thana: None,
        created_at: Utc::now(),
    }
}

fn notification_for(staff_id: Uuid, complaint_id: Uuid) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        recipient_staff_id: staff_id,
        complaint_id,
        created_at: Utc::now(),
        delivered: true,
        read: false,
    }
}

#[tokio::test]
async fn unassigned_zone_loses_unread_notifications_and_kept_zone_survives() {
    let fx = fixture();
    let admin = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::ZoneAdmin,
    };
    fx.staff_dir.upsert(admin.clone());
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();
    fx.assignments
        .assign_zone(admin.id, fx.zone9, None)
        .await
        .unwrap();

    let in_zone7 = complaint_in("DSCC", fx.zone7, fx.ward71);
    let in_zone9 = complaint_in("DSCC", fx.zone9, fx.ward91);
    fx.complaints.insert(&in_zone7).await.unwrap();
    fx.complaints.insert(&in_zone9).await.unwrap();

    let n7 = notification_for(admin.id, in_zone7.id);
    let n9 = notification_for(admin.id, in_zone9.id);
    fx.notifications.insert(&n7).await.unwrap();
    fx.notifications.insert(&n9).await.unwrap();

    fx.assignments
        .unassign_zone(admin.id, fx.zone7)
        .await
        .unwrap();

    let outcome = fx.guard.reconcile(admin.id).await.unwrap();
    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.kept, 1);

    let remaining = fx.notifications.unread_for(admin.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].complaint_id, in_zone9.id);
}

#[tokio::test]
async fn read_notifications_are_never_touched() {
    let fx = fixture();
    let admin = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::ZoneAdmin,
    };
    fx.staff_dir.upsert(admin.clone());
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();

    let in_zone7 = complaint_in("DSCC", fx.zone7, fx.ward71);
    fx.complaints.insert(&in_zone7).await.unwrap();

    let mut acknowledged = notification_for(admin.id, in_zone7.id);
    acknowledged.read = true;
    fx.notifications.insert(&acknowledged).await.unwrap();

    // Scope shrinks to nothing; the acknowledged row is historical record.
    fx.assignments
        .unassign_zone(admin.id, fx.zone7)
        .await
        .unwrap();
    let outcome = fx.guard.reconcile(admin.id).await.unwrap();
    assert_eq!(outcome.removed, 0);
    assert_eq!(outcome.kept, 0);
}

#[tokio::test]
async fn should_deliver_respects_scope_and_fails_closed() {
    let fx = fixture();
    let scoped = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::ZoneAdmin,
    };
    let unscoped = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::WardAdmin,
    };
    fx.staff_dir.upsert(scoped.clone());
    fx.staff_dir.upsert(unscoped.clone());
    fx.assignments
        .assign_zone(scoped.id, fx.zone7, None)
        .await
        .unwrap();

    let complaint = complaint_in("DSCC", fx.zone7, fx.ward71);
    fx.complaints.insert(&complaint).await.unwrap();

    let deliverable = notification_for(scoped.id, complaint.id);
    assert!(fx.guard.should_deliver(&deliverable, &complaint).await.unwrap());

    // Role set, no assignment: empty scope, not full scope.
    let withheld = notification_for(unscoped.id, complaint.id);
    assert!(!fx.guard.should_deliver(&withheld, &complaint).await.unwrap());

    // Recipient unknown to the directory: withheld.
    let orphan = notification_for(Uuid::new_v4(), complaint.id);
    assert!(!fx.guard.should_deliver(&orphan, &complaint).await.unwrap());
}

#[tokio::test]
async fn unscoped_staff_sees_zero_complaints() {
    let fx = fixture();
    let admin = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::WardAdmin,
    };
    fx.staff_dir.upsert(admin.clone());

    for complaint in [
        complaint_in("DSCC", fx.zone7, fx.ward71),
        complaint_in("DSCC", fx.zone9, fx.ward91),
    ] {
        fx.complaints.insert(&complaint).await.unwrap();
        let n = notification_for(admin.id, complaint.id);
        fx.notifications.insert(&n).await.unwrap();
    }

    let outcome = fx.guard.reconcile(admin.id).await.unwrap();
    assert_eq!(outcome.kept, 0);
    assert_eq!(outcome.removed, 2);
}

#[tokio::test]
async fn missing_complaint_surfaces_referential_integrity() {
    let fx = fixture();
    let admin = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::ZoneAdmin,
    };
    fx.staff_dir.upsert(admin.clone());

    let dangling = notification_for(admin.id, Uuid::new_v4());
    fx.notifications.insert(&dangling).await.unwrap();

    let err = fx.guard.reconcile(admin.id).await.unwrap_err();
    assert!(matches!(err, CleanCareError::ReferentialIntegrity(_)));
}

#[tokio::test]
async fn reconcile_loop_consumes_assignment_events() {
    let fx = fixture();
    let admin = StaffIdentity {
        id: Uuid::new_v4(),
        role: StaffRole::ZoneAdmin,
    };
    fx.staff_dir.upsert(admin.clone());
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();

    let in_zone7 = complaint_in("DSCC", fx.zone7, fx.ward71);
    fx.complaints.insert(&in_zone7).await.unwrap();
    fx.notifications
        .insert(&notification_for(admin.id, in_zone7.id))
        .await
        .unwrap();

    let handle = fx.guard.spawn_reconcile_loop(fx.assignments.subscribe());

    fx.assignments
        .unassign_zone(admin.id, fx.zone7)
        .await
        .unwrap();

    // Give the loop a moment to process the change event.
    let mut remaining = 1;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        remaining = fx.notifications.unread_for(admin.id).await.unwrap().len();
        if remaining == 0 {
            break;
        }
    }
    assert_eq!(remaining, 0);

    handle.abort();
}

//! Scope resolution across the three staff roles.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use cleancare_common::{
    AssignOutcome, CityCorporation, GeoStatus, StaffIdentity, StaffRole, UnassignOutcome, Ward,
    Zone,
};
use cleancare_scope::{AssignmentStore, GeoCache, MemoryAssignmentStore, ScopeResolver};

fn corp(code: &str, min: u32, max: u32) -> CityCorporation {
    CityCorporation {
        code: code.to_string(),
        name: format!("{code} City Corporation"),
        min_ward: min,
        max_ward: max,
        status: GeoStatus::Active,
    }
}

fn zone(id: Uuid, number: u32, code: &str) -> Zone {
    Zone {
        id,
        zone_number: number,
        city_corporation_code: code.to_string(),
        officer_name: None,
        officer_contact: None,
        status: GeoStatus::Active,
    }
}

fn ward(id: Uuid, number: u32, zone_id: Uuid) -> Ward {
    Ward {
        id,
        ward_number: number,
        zone_id,
        inspector_name: None,
        inspector_contact: None,
        status: GeoStatus::Active,
    }
}

struct Fixture {
    geo: Arc<GeoCache>,
    assignments: Arc<MemoryAssignmentStore>,
    resolver: ScopeResolver,
    zone7: Uuid,
    zone9: Uuid,
    ward42: Uuid,
}

fn fixture() -> Fixture {
    let geo = Arc::new(GeoCache::empty());
    let zone7 = Uuid::new_v4();
    let zone9 = Uuid::new_v4();
    let ward42 = Uuid::new_v4();

    geo.mutate(|t| {
        t.upsert_city_corporation(corp("DSCC", 1, 75))?;
        t.upsert_zone(zone(zone7, 7, "DSCC"))?;
        t.upsert_zone(zone(zone9, 9, "DSCC"))?;
        t.upsert_ward(ward(ward42, 42, zone7))
    })
    .unwrap();

    let assignments = Arc::new(MemoryAssignmentStore::new(Arc::clone(&geo)));
    let resolver = ScopeResolver::new(
        Arc::clone(&geo),
        Arc::clone(&assignments) as Arc<dyn AssignmentStore>,
    );

    Fixture {
        geo,
        assignments,
        resolver,
        zone7,
        zone9,
        ward42,
    }
}

fn staff(role: StaffRole) -> StaffIdentity {
    StaffIdentity {
        id: Uuid::new_v4(),
        role,
    }
}

#[tokio::test]
async fn ward_admin_resolves_to_exactly_their_ward() {
    let fx = fixture();
    let admin = staff(StaffRole::WardAdmin);
    fx.assignments
        .set_ward_assignment(admin.id, fx.ward42)
        .await
        .unwrap();

    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(predicate.ward_ids, BTreeSet::from([fx.ward42]));
    assert!(predicate.zone_ids.is_empty());
    assert!(predicate.city_corporation_codes.is_empty());
}

#[tokio::test]
async fn ward_admin_without_ward_resolves_to_empty_scope() {
    let fx = fixture();
    let admin = staff(StaffRole::WardAdmin);

    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert!(predicate.is_empty());
    assert!(fx.resolver.covered_wards(&admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn zone_admin_resolves_to_assigned_zone_set() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();
    fx.assignments
        .assign_zone(admin.id, fx.zone9, None)
        .await
        .unwrap();

    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(predicate.zone_ids, BTreeSet::from([fx.zone7, fx.zone9]));

    fx.assignments
        .unassign_zone(admin.id, fx.zone7)
        .await
        .unwrap();
    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(predicate.zone_ids, BTreeSet::from([fx.zone9]));
}

#[tokio::test]
async fn zone_admin_without_zones_resolves_to_empty_scope() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert!(predicate.is_empty());
}

#[tokio::test]
async fn city_admin_coverage_expands_with_new_zones() {
    let fx = fixture();
    let admin = staff(StaffRole::CityAdmin);
    fx.assignments
        .set_city_assignment(admin.id, "DSCC")
        .await
        .unwrap();

    let before = fx.resolver.covered_zones(&admin).await.unwrap();
    assert_eq!(before, BTreeSet::from([fx.zone7, fx.zone9]));

    // A brand-new zone under DSCC, with no assignment action at all.
    let zone11 = Uuid::new_v4();
    let ward60 = Uuid::new_v4();
    fx.geo
        .mutate(|t| {
            t.upsert_zone(zone(zone11, 11, "DSCC"))?;
            t.upsert_ward(ward(ward60, 60, zone11))
        })
        .unwrap();

    let after = fx.resolver.covered_zones(&admin).await.unwrap();
    assert!(after.contains(&zone11));
    assert!(fx
        .resolver
        .covered_wards(&admin)
        .await
        .unwrap()
        .contains(&ward60));
}

#[tokio::test]
async fn assign_zone_is_idempotent_and_emits_no_duplicate_event() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    let mut events = fx.assignments.subscribe();

    let first = fx
        .assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();
    assert_eq!(first, AssignOutcome::Assigned);

    let second = fx
        .assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();
    assert_eq!(second, AssignOutcome::AlreadyAssigned);

    let event = events.try_recv().unwrap();
    assert_eq!(event.staff_id, admin.id);
    assert_eq!(event.version, 1);
    // The no-op emitted nothing.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn unassign_of_absent_zone_is_a_noop() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    let outcome = fx
        .assignments
        .unassign_zone(admin.id, fx.zone7)
        .await
        .unwrap();
    assert_eq!(outcome, UnassignOutcome::NotAssigned);
    assert_eq!(fx.assignments.version(admin.id).await.unwrap(), 0);
}

#[tokio::test]
async fn assigning_unknown_zone_is_rejected() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    let err = fx
        .assignments
        .assign_zone(admin.id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        cleancare_common::CleanCareError::ReferentialIntegrity(_)
    ));
}

#[tokio::test]
async fn zone_assignments_may_span_city_corporations() {
    let fx = fixture();
    let dncc_zone = Uuid::new_v4();
    fx.geo
        .mutate(|t| {
            t.upsert_city_corporation(corp("DNCC", 1, 54))?;
            t.upsert_zone(zone(dncc_zone, 7, "DNCC"))
        })
        .unwrap();

    let admin = staff(StaffRole::ZoneAdmin);
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();
    fx.assignments
        .assign_zone(admin.id, dncc_zone, None)
        .await
        .unwrap();

    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(predicate.zone_ids, BTreeSet::from([fx.zone7, dncc_zone]));
}

#[tokio::test]
async fn cached_predicate_is_dropped_when_assignments_change() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();

    // Populate the cache.
    let first = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(first.zone_ids, BTreeSet::from([fx.zone7]));

    // The mutation bumps the version; the stale entry must not be served.
    fx.assignments
        .assign_zone(admin.id, fx.zone9, None)
        .await
        .unwrap();
    let second = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(second.zone_ids, BTreeSet::from([fx.zone7, fx.zone9]));
}

#[tokio::test]
async fn drifted_assignment_surfaces_referential_integrity() {
    let fx = fixture();
    let admin = staff(StaffRole::ZoneAdmin);
    fx.assignments
        .assign_zone(admin.id, fx.zone7, None)
        .await
        .unwrap();

    // Replace the tree with one that no longer knows zone 7 (a drifted load).
    let mut bare = cleancare_scope::GeoTree::new();
    bare.upsert_city_corporation(corp("DSCC", 1, 75)).unwrap();
    fx.geo.replace(bare);

    let err = fx.resolver.resolve(&admin).await.unwrap_err();
    assert!(matches!(
        err,
        cleancare_common::CleanCareError::ReferentialIntegrity(_)
    ));
}

#[tokio::test]
async fn ward_assignment_replaces_previous_value() {
    let fx = fixture();
    let admin = staff(StaffRole::WardAdmin);
    let ward43 = Uuid::new_v4();
    fx.geo
        .mutate(|t| t.upsert_ward(ward(ward43, 43, fx.zone9)))
        .unwrap();

    fx.assignments
        .set_ward_assignment(admin.id, fx.ward42)
        .await
        .unwrap();
    fx.assignments
        .set_ward_assignment(admin.id, ward43)
        .await
        .unwrap();

    let predicate = fx.resolver.resolve(&admin).await.unwrap();
    assert_eq!(predicate.ward_ids, BTreeSet::from([ward43]));
}

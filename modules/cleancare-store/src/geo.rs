//! Load the geo tree from Postgres into an in-memory snapshot.
//!
//! Runs at startup; runtime mutations go through `GeoCache::mutate` and are
//! persisted by the admin tooling that owns geography writes. Drifted rows
//! (a ward whose zone is gone, a zone whose corporation is gone) fail the
//! load rather than being silently skipped.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

use cleancare_common::{CityCorporation, CleanCareError, GeoStatus, Ward, Zone};
use cleancare_scope::GeoTree;

use crate::db_err;

fn status_from_str(s: &str) -> GeoStatus {
    match s {
        "inactive" => GeoStatus::Inactive,
        _ => GeoStatus::Active,
    }
}

fn row_to_corporation(row: &PgRow) -> Result<CityCorporation, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(CityCorporation {
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        min_ward: row.try_get::<i32, _>("min_ward")? as u32,
        max_ward: row.try_get::<i32, _>("max_ward")? as u32,
        status: status_from_str(&status),
    })
}

fn row_to_zone(row: &PgRow) -> Result<Zone, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Zone {
        id: row.try_get("id")?,
        zone_number: row.try_get::<i32, _>("zone_number")? as u32,
        city_corporation_code: row.try_get("city_corporation_code")?,
        officer_name: row.try_get("officer_name")?,
        officer_contact: row.try_get("officer_contact")?,
        status: status_from_str(&status),
    })
}

fn row_to_ward(row: &PgRow) -> Result<Ward, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(Ward {
        id: row.try_get("id")?,
        ward_number: row.try_get::<i32, _>("ward_number")? as u32,
        zone_id: row.try_get("zone_id")?,
        inspector_name: row.try_get("inspector_name")?,
        inspector_contact: row.try_get("inspector_contact")?,
        status: status_from_str(&status),
    })
}

pub async fn load_geo_tree(pool: &PgPool) -> Result<GeoTree, CleanCareError> {
    let mut tree = GeoTree::new();

    let corporations = sqlx::query(
        "SELECT code, name, min_ward, max_ward, status FROM city_corporations",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;
    for row in &corporations {
        tree.upsert_city_corporation(row_to_corporation(row).map_err(db_err)?)?;
    }

    let zones = sqlx::query(
        "SELECT id, zone_number, city_corporation_code, officer_name, officer_contact, status
         FROM zones",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;
    for row in &zones {
        tree.upsert_zone(row_to_zone(row).map_err(db_err)?)?;
    }

    let wards = sqlx::query(
        "SELECT id, ward_number, zone_id, inspector_name, inspector_contact, status FROM wards",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;
    for row in &wards {
        tree.upsert_ward(row_to_ward(row).map_err(db_err)?)?;
    }

    info!(
        city_corporations = corporations.len(),
        zones = zones.len(),
        wards = wards.len(),
        "Geo tree loaded"
    );
    Ok(tree)
}

//! Postgres complaint store.
//!
//! The `*_if_absent` writers guard at the SQL level (`WHERE ... IS NULL`), so
//! backfill idempotency holds even with concurrent writers.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use cleancare_common::{CleanCareError, Complaint, ComplaintStatus, GeoChain};
use cleancare_scope::ComplaintStore;

use crate::db_err;

const COMPLAINT_COLUMNS: &str = "id, reporter_user_id, title, status, \
     reporter_city_corporation_code, reporter_zone_id, reporter_ward_id, \
     incident_city_corporation_code, incident_zone_id, incident_ward_id, \
     legacy_thana, created_at";

pub struct PgComplaintStore {
    pool: PgPool,
}

impl PgComplaintStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_from_str(s: &str) -> ComplaintStatus {
    match s {
        "in_progress" => ComplaintStatus::InProgress,
        "resolved" => ComplaintStatus::Resolved,
        "rejected" => ComplaintStatus::Rejected,
        _ => ComplaintStatus::Pending,
    }
}

fn row_to_complaint(row: &PgRow) -> Result<Complaint, sqlx::Error> {
    let reporter = match (
        row.try_get::<Option<String>, _>("reporter_city_corporation_code")?,
        row.try_get::<Option<Uuid>, _>("reporter_zone_id")?,
        row.try_get::<Option<Uuid>, _>("reporter_ward_id")?,
    ) {
        (Some(city_corporation_code), Some(zone_id), Some(ward_id)) => Some(GeoChain {
            city_corporation_code,
            zone_id,
            ward_id,
        }),
        _ => None,
    };

    let status: String = row.try_get("status")?;

    Ok(Complaint {
        id: row.try_get("id")?,
        reporter_user_id: row.try_get("reporter_user_id")?,
        title: row.try_get("title")?,
        status: status_from_str(&status),
        reporter,
        incident_city_corporation_code: row.try_get("incident_city_corporation_code")?,
        incident_zone_id: row.try_get("incident_zone_id")?,
        incident_ward_id: row.try_get("incident_ward_id")?,
        legacy_thana: row.try_get("legacy_thana")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ComplaintStore for PgComplaintStore {
    async fn get(&self, id: Uuid) -> Result<Option<Complaint>, CleanCareError> {
        let query = format!("SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| row_to_complaint(&r)).transpose().map_err(db_err)
    }

    async fn list_all(&self) -> Result<Vec<Complaint>, CleanCareError> {
        let query = format!("SELECT {COMPLAINT_COLUMNS} FROM complaints ORDER BY created_at ASC");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(row_to_complaint)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    async fn insert(&self, complaint: &Complaint) -> Result<(), CleanCareError> {
        sqlx::query(
            r#"
            INSERT INTO complaints (
                id, reporter_user_id, title, status,
                reporter_city_corporation_code, reporter_zone_id, reporter_ward_id,
                incident_city_corporation_code, incident_zone_id, incident_ward_id,
                legacy_thana, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(complaint.id)
        .bind(complaint.reporter_user_id)
        .bind(&complaint.title)
        .bind(complaint.status.to_string())
        .bind(
            complaint
                .reporter
                .as_ref()
                .map(|c| c.city_corporation_code.clone()),
        )
        .bind(complaint.reporter.as_ref().map(|c| c.zone_id))
        .bind(complaint.reporter.as_ref().map(|c| c.ward_id))
        .bind(&complaint.incident_city_corporation_code)
        .bind(complaint.incident_zone_id)
        .bind(complaint.incident_ward_id)
        .bind(&complaint.legacy_thana)
        .bind(complaint.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn set_incident_if_absent(
        &self,
        id: Uuid,
        chain: &GeoChain,
    ) -> Result<bool, CleanCareError> {
        let written = sqlx::query(
            r#"
            UPDATE complaints
            SET incident_city_corporation_code = $2,
                incident_zone_id = $3,
                incident_ward_id = $4
            WHERE id = $1
              AND incident_city_corporation_code IS NULL
              AND incident_zone_id IS NULL
              AND incident_ward_id IS NULL
            "#,
        )
        .bind(id)
        .bind(&chain.city_corporation_code)
        .bind(chain.zone_id)
        .bind(chain.ward_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if written == 1 {
            return Ok(true);
        }

        // Nothing written: distinguish "already set" from "row is gone".
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM complaints WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "unknown complaint {id}"
            )));
        }
        Ok(false)
    }

    async fn set_reporter_if_absent(
        &self,
        id: Uuid,
        chain: &GeoChain,
    ) -> Result<bool, CleanCareError> {
        let written = sqlx::query(
            r#"
            UPDATE complaints
            SET reporter_city_corporation_code = $2,
                reporter_zone_id = $3,
                reporter_ward_id = $4
            WHERE id = $1
              AND reporter_city_corporation_code IS NULL
              AND reporter_zone_id IS NULL
              AND reporter_ward_id IS NULL
            "#,
        )
        .bind(id)
        .bind(&chain.city_corporation_code)
        .bind(chain.zone_id)
        .bind(chain.ward_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        if written == 1 {
            return Ok(true);
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM complaints WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "unknown complaint {id}"
            )));
        }
        Ok(false)
    }
}

//! Postgres assignment relation with atomic change events.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use cleancare_common::{
    AssignOutcome, AssignmentChanged, CleanCareError, Config, StaffAssignment, StaffIdentity,
    StaffRole, UnassignOutcome,
};
use cleancare_scope::AssignmentStore;

use crate::db_err;

pub struct PgAssignmentStore {
    pool: PgPool,
    events: broadcast::Sender<AssignmentChanged>,
}

impl PgAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_capacity(pool, 256)
    }

    pub fn with_capacity(pool: PgPool, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self { pool, events }
    }

    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        Self::with_capacity(pool, config.event_channel_capacity)
    }

    /// Bump the per-staff version inside the caller's transaction. The row
    /// lock on `assignment_versions` is what serializes concurrent mutations
    /// to the same staff identity.
    async fn bump_version(
        tx: &mut Transaction<'_, Postgres>,
        staff_id: Uuid,
    ) -> Result<i64, CleanCareError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO assignment_versions (staff_id, version)
            VALUES ($1, 1)
            ON CONFLICT (staff_id) DO UPDATE SET version = assignment_versions.version + 1
            RETURNING version
            "#,
        )
        .bind(staff_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_err)?;

        sqlx::query("INSERT INTO assignment_events (staff_id, version) VALUES ($1, $2)")
            .bind(staff_id)
            .bind(row.0)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        Ok(row.0)
    }

    /// Broadcast in-process and nudge other processes. The event row is
    /// already durable; the NOTIFY is best-effort.
    async fn publish(&self, staff_id: Uuid, version: i64) {
        let _ = self
            .events
            .send(AssignmentChanged::new(staff_id, version as u64));

        let result = sqlx::query("SELECT pg_notify('assignment_events', $1::text)")
            .bind(staff_id.to_string())
            .execute(&self.pool)
            .await;
        if let Err(e) = result {
            warn!(error = %e, staff_id = %staff_id, "PG NOTIFY failed (non-fatal)");
        }
    }

    async fn zone_exists(
        tx: &mut Transaction<'_, Postgres>,
        zone_id: Uuid,
    ) -> Result<bool, CleanCareError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM zones WHERE id = $1")
            .bind(zone_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
    async fn assign_zone(
        &self,
        staff_id: Uuid,
        zone_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<AssignOutcome, CleanCareError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if !Self::zone_exists(&mut tx, zone_id).await? {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "cannot assign unknown zone {zone_id}"
            )));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO zone_assignments (staff_id, zone_id, assigned_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (staff_id, zone_id) DO NOTHING
            "#,
        )
        .bind(staff_id)
        .bind(zone_id)
        .bind(assigned_by)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(AssignOutcome::AlreadyAssigned);
        }

        let version = Self::bump_version(&mut tx, staff_id).await?;
        tx.commit().await.map_err(db_err)?;
        self.publish(staff_id, version).await;

        info!(staff_id = %staff_id, zone_id = %zone_id, "Zone assigned");
        Ok(AssignOutcome::Assigned)
    }

    async fn unassign_zone(
        &self,
        staff_id: Uuid,
        zone_id: Uuid,
    ) -> Result<UnassignOutcome, CleanCareError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let removed = sqlx::query(
            "DELETE FROM zone_assignments WHERE staff_id = $1 AND zone_id = $2",
        )
        .bind(staff_id)
        .bind(zone_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(UnassignOutcome::NotAssigned);
        }

        let version = Self::bump_version(&mut tx, staff_id).await?;
        tx.commit().await.map_err(db_err)?;
        self.publish(staff_id, version).await;

        info!(staff_id = %staff_id, zone_id = %zone_id, "Zone unassigned");
        Ok(UnassignOutcome::Removed)
    }

    async fn assigned_zones(&self, staff_id: Uuid) -> Result<BTreeSet<Uuid>, CleanCareError> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT zone_id FROM zone_assignments WHERE staff_id = $1")
                .bind(staff_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn set_ward_assignment(
        &self,
        staff_id: Uuid,
        ward_id: Uuid,
    ) -> Result<(), CleanCareError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let ward: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM wards WHERE id = $1")
            .bind(ward_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if ward.is_none() {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "cannot assign unknown ward {ward_id}"
            )));
        }

        let current: Option<(Uuid,)> = sqlx::query_as(
            "SELECT ward_id FROM ward_assignments WHERE staff_id = $1 FOR UPDATE",
        )
        .bind(staff_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if current.map(|(id,)| id) == Some(ward_id) {
            tx.rollback().await.map_err(db_err)?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO ward_assignments (staff_id, ward_id)
            VALUES ($1, $2)
            ON CONFLICT (staff_id) DO UPDATE SET ward_id = EXCLUDED.ward_id
            "#,
        )
        .bind(staff_id)
        .bind(ward_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let version = Self::bump_version(&mut tx, staff_id).await?;
        tx.commit().await.map_err(db_err)?;
        self.publish(staff_id, version).await;

        info!(staff_id = %staff_id, ward_id = %ward_id, "Ward assignment set");
        Ok(())
    }

    async fn set_city_assignment(
        &self,
        staff_id: Uuid,
        city_corporation_code: &str,
    ) -> Result<(), CleanCareError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let corp: Option<(String,)> =
            sqlx::query_as("SELECT code FROM city_corporations WHERE code = $1")
                .bind(city_corporation_code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        if corp.is_none() {
            return Err(CleanCareError::ReferentialIntegrity(format!(
                "cannot assign unknown city corporation {city_corporation_code}"
            )));
        }

        let current: Option<(String,)> = sqlx::query_as(
            "SELECT city_corporation_code FROM city_assignments WHERE staff_id = $1 FOR UPDATE",
        )
        .bind(staff_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if current.as_ref().map(|(code,)| code.as_str()) == Some(city_corporation_code) {
            tx.rollback().await.map_err(db_err)?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO city_assignments (staff_id, city_corporation_code)
            VALUES ($1, $2)
            ON CONFLICT (staff_id) DO UPDATE
                SET city_corporation_code = EXCLUDED.city_corporation_code
            "#,
        )
        .bind(staff_id)
        .bind(city_corporation_code)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let version = Self::bump_version(&mut tx, staff_id).await?;
        tx.commit().await.map_err(db_err)?;
        self.publish(staff_id, version).await;

        info!(staff_id = %staff_id, code = city_corporation_code, "City assignment set");
        Ok(())
    }

    async fn snapshot(&self, staff: &StaffIdentity) -> Result<StaffAssignment, CleanCareError> {
        let assignment = match staff.role {
            StaffRole::WardAdmin => {
                let row: Option<(Uuid,)> =
                    sqlx::query_as("SELECT ward_id FROM ward_assignments WHERE staff_id = $1")
                        .bind(staff.id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(db_err)?;
                match row {
                    Some((ward_id,)) => StaffAssignment::Ward { ward_id },
                    None => StaffAssignment::Unscoped,
                }
            }
            StaffRole::ZoneAdmin => {
                let zone_ids = self.assigned_zones(staff.id).await?;
                if zone_ids.is_empty() {
                    StaffAssignment::Unscoped
                } else {
                    StaffAssignment::Zones { zone_ids }
                }
            }
            StaffRole::CityAdmin => {
                let row: Option<(String,)> = sqlx::query_as(
                    "SELECT city_corporation_code FROM city_assignments WHERE staff_id = $1",
                )
                .bind(staff.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
                match row {
                    Some((city_corporation_code,)) => StaffAssignment::City {
                        city_corporation_code,
                    },
                    None => StaffAssignment::Unscoped,
                }
            }
        };
        Ok(assignment)
    }

    async fn version(&self, staff_id: Uuid) -> Result<u64, CleanCareError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM assignment_versions WHERE staff_id = $1")
                .bind(staff_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(row.map(|(v,)| v as u64).unwrap_or(0))
    }

    fn subscribe(&self) -> broadcast::Receiver<AssignmentChanged> {
        self.events.subscribe()
    }
}

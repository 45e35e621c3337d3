//! Postgres staff directory.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use cleancare_common::{CleanCareError, StaffIdentity, StaffRole};
use cleancare_scope::StaffDirectory;

use crate::db_err;

pub struct PgStaffDirectory {
    pool: PgPool,
}

impl PgStaffDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, staff: &StaffIdentity) -> Result<(), CleanCareError> {
        sqlx::query(
            r#"
            INSERT INTO staff (id, role)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(staff.id)
        .bind(staff.role.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

fn role_from_str(s: &str) -> Option<StaffRole> {
    match s {
        "ward_admin" => Some(StaffRole::WardAdmin),
        "zone_admin" => Some(StaffRole::ZoneAdmin),
        "city_admin" => Some(StaffRole::CityAdmin),
        _ => None,
    }
}

#[async_trait]
impl StaffDirectory for PgStaffDirectory {
    async fn get(&self, staff_id: Uuid) -> Result<Option<StaffIdentity>, CleanCareError> {
        let row: Option<(Uuid, String)> =
            sqlx::query_as("SELECT id, role FROM staff WHERE id = $1")
                .bind(staff_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        let Some((id, role)) = row else {
            return Ok(None);
        };
        let Some(role) = role_from_str(&role) else {
            return Err(CleanCareError::Validation(format!(
                "staff {id} has unknown role {role:?}"
            )));
        };
        Ok(Some(StaffIdentity { id, role }))
    }
}

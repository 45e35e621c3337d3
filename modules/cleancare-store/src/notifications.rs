//! Postgres notification store.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use cleancare_common::{CleanCareError, Notification};
use cleancare_scope::NotificationStore;

use crate::db_err;

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_notification(row: &PgRow) -> Result<Notification, sqlx::Error> {
    Ok(Notification {
        id: row.try_get("id")?,
        recipient_staff_id: row.try_get("recipient_staff_id")?,
        complaint_id: row.try_get("complaint_id")?,
        created_at: row.try_get("created_at")?,
        delivered: row.try_get("delivered")?,
        read: row.try_get("is_read")?,
    })
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<(), CleanCareError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, recipient_staff_id, complaint_id, created_at, delivered, is_read)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(notification.id)
        .bind(notification.recipient_staff_id)
        .bind(notification.complaint_id)
        .bind(notification.created_at)
        .bind(notification.delivered)
        .bind(notification.read)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn unread_for(&self, staff_id: Uuid) -> Result<Vec<Notification>, CleanCareError> {
        let rows = sqlx::query(
            r#"
            SELECT id, recipient_staff_id, complaint_id, created_at, delivered, is_read
            FROM notifications
            WHERE recipient_staff_id = $1 AND NOT is_read
            ORDER BY created_at ASC
            "#,
        )
        .bind(staff_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(row_to_notification)
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, CleanCareError> {
        let removed = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn mark_read(&self, id: Uuid) -> Result<bool, CleanCareError> {
        let updated = sqlx::query("UPDATE notifications SET is_read = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
        Ok(updated > 0)
    }
}

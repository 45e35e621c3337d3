//! Idempotent schema migration. Safe to run at every startup.

use sqlx::PgPool;
use tracing::info;

use cleancare_common::CleanCareError;

use crate::db_err;

pub async fn migrate(pool: &PgPool) -> Result<(), CleanCareError> {
    info!("Running schema migrations...");

    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS city_corporations (
            code      TEXT PRIMARY KEY,
            name      TEXT NOT NULL,
            min_ward  INT  NOT NULL,
            max_ward  INT  NOT NULL,
            status    TEXT NOT NULL DEFAULT 'active'
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS zones (
            id                     UUID PRIMARY KEY,
            zone_number            INT  NOT NULL,
            city_corporation_code  TEXT NOT NULL REFERENCES city_corporations(code),
            officer_name           TEXT,
            officer_contact        TEXT,
            status                 TEXT NOT NULL DEFAULT 'active',
            UNIQUE (city_corporation_code, zone_number)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS wards (
            id                 UUID PRIMARY KEY,
            ward_number        INT  NOT NULL,
            zone_id            UUID NOT NULL REFERENCES zones(id),
            inspector_name     TEXT,
            inspector_contact  TEXT,
            status             TEXT NOT NULL DEFAULT 'active',
            UNIQUE (zone_id, ward_number)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS staff (
            id    UUID PRIMARY KEY,
            role  TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS zone_assignments (
            staff_id     UUID NOT NULL,
            zone_id      UUID NOT NULL REFERENCES zones(id),
            assigned_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            assigned_by  UUID,
            PRIMARY KEY (staff_id, zone_id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ward_assignments (
            staff_id  UUID PRIMARY KEY,
            ward_id   UUID NOT NULL REFERENCES wards(id)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS city_assignments (
            staff_id               UUID PRIMARY KEY,
            city_corporation_code  TEXT NOT NULL REFERENCES city_corporations(code)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS assignment_versions (
            staff_id  UUID   PRIMARY KEY,
            version   BIGINT NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS assignment_events (
            seq         BIGSERIAL   PRIMARY KEY,
            staff_id    UUID        NOT NULL,
            version     BIGINT      NOT NULL,
            changed_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS complaints (
            id                              UUID PRIMARY KEY,
            reporter_user_id                UUID NOT NULL,
            title                           TEXT NOT NULL,
            status                          TEXT NOT NULL DEFAULT 'pending',
            reporter_city_corporation_code  TEXT,
            reporter_zone_id                UUID,
            reporter_ward_id                UUID,
            incident_city_corporation_code  TEXT,
            incident_zone_id                UUID,
            incident_ward_id                UUID,
            legacy_thana                    TEXT,
            created_at                      TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id                  UUID PRIMARY KEY,
            recipient_staff_id  UUID NOT NULL,
            complaint_id        UUID NOT NULL,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
            delivered           BOOLEAN NOT NULL DEFAULT false,
            is_read             BOOLEAN NOT NULL DEFAULT false
        )
        "#,
        "CREATE INDEX IF NOT EXISTS complaints_incident_zone_idx ON complaints(incident_zone_id)",
        "CREATE INDEX IF NOT EXISTS complaints_incident_ward_idx ON complaints(incident_ward_id)",
        "CREATE INDEX IF NOT EXISTS notifications_unread_idx
             ON notifications(recipient_staff_id) WHERE NOT is_read",
        "CREATE INDEX IF NOT EXISTS assignment_events_staff_idx ON assignment_events(staff_id)",
    ];

    for statement in &statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(db_err)?;
    }

    info!("Schema migrations complete");
    Ok(())
}

//! Database schema migrations.
//!
//! Applies the initial schema: the CRM record tables the plan executor
//! mutates, the plans table, and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use dealflow_core::error::DealflowError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental
/// changes.
pub fn run_migrations(conn: &Connection) -> Result<(), DealflowError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| DealflowError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DealflowError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema')",
            [],
        )
        .map_err(|e| DealflowError::Storage(format!("Failed to record migration: {}", e)))?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
///
/// Every record table carries an `owner_id` column; the record store conjoins
/// it into every predicate for tenant isolation.
fn apply_v1(conn: &Connection) -> Result<(), DealflowError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS clients (
            id              TEXT PRIMARY KEY NOT NULL,
            owner_id        TEXT NOT NULL,
            client_name     TEXT NOT NULL DEFAULT '',
            brand_name      TEXT NOT NULL DEFAULT '',
            stage           TEXT NOT NULL DEFAULT 'lead',
            contract_status TEXT,
            contract_value  REAL,
            notes           TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_clients_owner
            ON clients (owner_id, client_name);

        CREATE TABLE IF NOT EXISTS contacts (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            client_id   TEXT,
            name        TEXT NOT NULL DEFAULT '',
            email       TEXT,
            phone       TEXT,
            role        TEXT,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_contacts_owner
            ON contacts (owner_id, client_id);

        CREATE TABLE IF NOT EXISTS activities (
            id              TEXT PRIMARY KEY NOT NULL,
            owner_id        TEXT NOT NULL,
            client_id       TEXT,
            activity_type   TEXT NOT NULL DEFAULT 'note',
            summary         TEXT NOT NULL DEFAULT '',
            occurred_at     TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_activities_owner
            ON activities (owner_id, client_id);

        CREATE TABLE IF NOT EXISTS schedules (
            id              TEXT PRIMARY KEY NOT NULL,
            owner_id        TEXT NOT NULL,
            client_id       TEXT,
            title           TEXT NOT NULL DEFAULT '',
            scheduled_at    TEXT,
            location        TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_schedules_owner
            ON schedules (owner_id, scheduled_at);

        CREATE TABLE IF NOT EXISTS reminders (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            title       TEXT NOT NULL DEFAULT '',
            remind_at   TEXT,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_reminders_owner
            ON reminders (owner_id, remind_at);

        CREATE TABLE IF NOT EXISTS proposals (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            client_id   TEXT,
            title       TEXT NOT NULL DEFAULT '',
            amount      REAL,
            status      TEXT,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_proposals_owner
            ON proposals (owner_id, client_id);

        CREATE TABLE IF NOT EXISTS documents (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            client_id   TEXT,
            file_name   TEXT NOT NULL DEFAULT '',
            url         TEXT,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_owner
            ON documents (owner_id, client_id);

        -- Action plans, stored as JSON with a status column so the
        -- executed-gate is a single conditional UPDATE.
        CREATE TABLE IF NOT EXISTS plans (
            id          TEXT PRIMARY KEY NOT NULL,
            owner_id    TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'approved', 'rejected',
                                          'executed', 'failed')),
            intent      TEXT NOT NULL,
            body        TEXT NOT NULL,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at  INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_plans_owner_status
            ON plans (owner_id, status, created_at DESC);
        ",
    )
    .map_err(|e| DealflowError::Storage(format!("Failed to apply v1 schema: {}", e)))?;
    Ok(())
}

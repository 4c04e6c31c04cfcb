//! Plan persistence and the atomic execution gate.
//!
//! Plans are stored as JSON bodies with a status column. The executed-gate
//! required by the concurrency model is a single conditional UPDATE:
//! exactly one concurrent executor of a plan can win the claim.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::debug;

use dealflow_core::error::DealflowError;

use crate::db::Database;

/// A stored plan row. The body is the serialized `ActionPlan`; this crate
/// does not interpret it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRow {
    pub id: String,
    pub owner_id: String,
    pub status: String,
    pub intent: String,
    pub body: String,
    pub created_at: i64,
}

/// Repository for plan rows.
pub struct PlanRepository {
    db: Arc<Database>,
}

impl PlanRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new plan. Fails if the id already exists — plan ids come
    /// from the upstream producer and must be unique.
    pub fn save(&self, row: &PlanRow) -> Result<(), DealflowError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO plans (id, owner_id, status, intent, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.owner_id,
                    row.status,
                    row.intent,
                    row.body,
                    row.created_at,
                ],
            )
            .map_err(|e| DealflowError::Storage(format!("Failed to save plan: {}", e)))?;
            Ok(())
        })
    }

    /// Fetch a plan by id.
    pub fn get(&self, id: &str) -> Result<Option<PlanRow>, DealflowError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner_id, status, intent, body, created_at
                 FROM plans WHERE id = ?1",
                [id],
                |row| {
                    Ok(PlanRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        status: row.get(2)?,
                        intent: row.get(3)?,
                        body: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DealflowError::Storage(format!("Failed to load plan: {}", e)))
        })
    }

    /// Replace a plan's body (re-assessment after human edits).
    pub fn update_body(&self, id: &str, body: &str) -> Result<(), DealflowError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE plans SET body = ?2, updated_at = strftime('%s', 'now')
                     WHERE id = ?1",
                    rusqlite::params![id, body],
                )
                .map_err(|e| DealflowError::Storage(format!("Failed to update plan: {}", e)))?;
            if changed == 0 {
                return Err(DealflowError::Storage(format!("Plan not found: {}", id)));
            }
            Ok(())
        })
    }

    /// Unconditionally set a plan's status. Lifecycle validation happens in
    /// the engine before this is called.
    pub fn set_status(&self, id: &str, status: &str) -> Result<(), DealflowError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE plans SET status = ?2, updated_at = strftime('%s', 'now')
                     WHERE id = ?1",
                    rusqlite::params![id, status],
                )
                .map_err(|e| DealflowError::Storage(format!("Failed to set plan status: {}", e)))?;
            if changed == 0 {
                return Err(DealflowError::Storage(format!("Plan not found: {}", id)));
            }
            Ok(())
        })
    }

    /// Atomically move a plan from `expected` status to `next`.
    ///
    /// Returns `true` iff this caller performed the transition. Concurrent
    /// executors of the same plan race on this single UPDATE; exactly one
    /// observes an affected-row count of 1.
    pub fn claim(&self, id: &str, expected: &str, next: &str) -> Result<bool, DealflowError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE plans SET status = ?3, updated_at = strftime('%s', 'now')
                     WHERE id = ?1 AND status = ?2",
                    rusqlite::params![id, expected, next],
                )
                .map_err(|e| DealflowError::Storage(format!("Failed to claim plan: {}", e)))?;
            debug!(plan_id = %id, expected, next, won = changed == 1, "Plan claim");
            Ok(changed == 1)
        })
    }
}

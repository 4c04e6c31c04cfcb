//! Best-effort compensation of applied steps, in reverse order.
//!
//! Rollback never gives up early: a compensation that fails is recorded and
//! the coordinator moves on to the next one, so as much prior state as
//! possible is restored. The outcome reports exactly what was undone.

use serde_json::Value as Json;
use tracing::{info, warn};

use dealflow_core::types::JsonMap;

use crate::step::{AppliedStep, Compensation};
use crate::store::DataStore;

/// What the rollback pass accomplished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollbackOutcome {
    /// Compensations that required a store operation.
    pub attempted: usize,
    /// Compensations that completed.
    pub undone: usize,
    /// Step index and error message for each compensation that failed.
    pub failures: Vec<(usize, String)>,
}

impl RollbackOutcome {
    /// True when every attempted compensation completed.
    pub fn clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Undo the applied steps, newest first.
pub async fn rollback(
    store: &dyn DataStore,
    user_id: &str,
    applied: &[AppliedStep],
) -> RollbackOutcome {
    let mut outcome = RollbackOutcome::default();

    for step in applied.iter().rev() {
        match &step.compensation {
            Compensation::None => {}
            Compensation::Irreversible => {
                warn!(step = step.index, "Side effect cannot be rolled back");
            }
            Compensation::DeleteInserted { table, record_id } => {
                outcome.attempted += 1;
                let mut filter = JsonMap::new();
                filter.insert("id".to_string(), Json::String(record_id.clone()));
                match store.delete(user_id, table, &filter).await {
                    Ok(_) => outcome.undone += 1,
                    Err(e) => outcome.failures.push((step.index, e.to_string())),
                }
            }
            Compensation::RestoreRows { table, rows } => {
                outcome.attempted += 1;
                match restore_rows(store, user_id, table, rows).await {
                    Ok(()) => outcome.undone += 1,
                    Err(e) => outcome.failures.push((step.index, e)),
                }
            }
            Compensation::ReinsertRows { table, rows } => {
                outcome.attempted += 1;
                match reinsert_rows(store, user_id, table, rows).await {
                    Ok(()) => outcome.undone += 1,
                    Err(e) => outcome.failures.push((step.index, e)),
                }
            }
        }
    }

    info!(
        attempted = outcome.attempted,
        undone = outcome.undone,
        failures = outcome.failures.len(),
        "Rollback finished"
    );
    outcome
}

/// Write snapshotted field values back over updated rows, keyed by id.
async fn restore_rows(
    store: &dyn DataStore,
    user_id: &str,
    table: &str,
    rows: &[Json],
) -> Result<(), String> {
    for row in rows {
        let object = row.as_object().ok_or("snapshot row is not an object")?;
        let id = object
            .get("id")
            .and_then(Json::as_str)
            .ok_or("snapshot row has no id")?;

        let mut values = JsonMap::new();
        for (k, v) in object {
            if k == "id" || k == "owner_id" || k == "created_at" {
                continue;
            }
            values.insert(k.clone(), v.clone());
        }

        let mut filter = JsonMap::new();
        filter.insert("id".to_string(), Json::String(id.to_string()));
        store
            .update(user_id, table, &filter, &values)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Re-insert deleted rows with their original ids.
async fn reinsert_rows(
    store: &dyn DataStore,
    user_id: &str,
    table: &str,
    rows: &[Json],
) -> Result<(), String> {
    for row in rows {
        let object = row.as_object().ok_or("snapshot row is not an object")?;
        let mut values = JsonMap::new();
        for (k, v) in object {
            if k == "owner_id" {
                continue;
            }
            values.insert(k.clone(), v.clone());
        }
        store
            .insert(user_id, table, &values)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

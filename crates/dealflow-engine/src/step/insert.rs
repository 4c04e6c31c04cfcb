//! Insert step: create one record.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::ExecuteError;
use crate::step::{Compensation, StepContext, StepHandler, StepOutcome};
use crate::types::{ActionStep, StepType};

pub struct InsertHandler;

#[async_trait]
impl StepHandler for InsertHandler {
    fn step_type(&self) -> StepType {
        StepType::Insert
    }

    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
    ) -> Result<StepOutcome, ExecuteError> {
        if step.values.is_empty() {
            return Err(ExecuteError::Validation(
                "insert step has no values".to_string(),
            ));
        }

        let row = ctx.store.insert(ctx.user_id, &step.table, &step.values).await?;
        let record_id = row
            .get("id")
            .and_then(Json::as_str)
            .ok_or_else(|| {
                ExecuteError::Validation(format!("insert into {} returned no id", step.table))
            })?
            .to_string();

        Ok(StepOutcome {
            data: row,
            compensation: Compensation::DeleteInserted {
                table: step.table.clone(),
                record_id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::test_support::step;
    use crate::store::{MemoryStore, RecordingMailer};
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_returns_row_and_compensation() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::new();
        let ctx = StepContext {
            user_id: "user-1",
            store: &store,
            mailer: &mailer,
        };

        let outcome = InsertHandler
            .execute(
                &ctx,
                &step(StepType::Insert, "clients", json!({}), json!({"client_name": "Acme"})),
            )
            .await
            .unwrap();

        assert_eq!(outcome.data["client_name"], "Acme");
        let id = outcome.data["id"].as_str().unwrap().to_string();
        assert_eq!(
            outcome.compensation,
            Compensation::DeleteInserted {
                table: "clients".to_string(),
                record_id: id,
            }
        );
        assert_eq!(store.rows("user-1", "clients").len(), 1);
    }

    #[tokio::test]
    async fn test_insert_without_values_is_invalid() {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::new();
        let ctx = StepContext {
            user_id: "user-1",
            store: &store,
            mailer: &mailer,
        };

        let err = InsertHandler
            .execute(&ctx, &step(StepType::Insert, "clients", json!({}), json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Validation(_)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_insert_storage_failure_propagates() {
        let store = MemoryStore::new();
        store.fail_table("clients");
        let mailer = RecordingMailer::new();
        let ctx = StepContext {
            user_id: "user-1",
            store: &store,
            mailer: &mailer,
        };

        let err = InsertHandler
            .execute(
                &ctx,
                &step(StepType::Insert, "clients", json!({}), json!({"client_name": "A"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Storage(_)));
    }
}

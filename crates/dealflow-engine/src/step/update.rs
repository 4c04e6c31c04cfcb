//! Update step: modify matching records, snapshotting them first.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::ExecuteError;
use crate::step::{Compensation, StepContext, StepHandler, StepOutcome};
use crate::types::{ActionStep, StepType};

pub struct UpdateHandler;

#[async_trait]
impl StepHandler for UpdateHandler {
    fn step_type(&self) -> StepType {
        StepType::Update
    }

    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
    ) -> Result<StepOutcome, ExecuteError> {
        if step.where_.is_empty() {
            return Err(ExecuteError::Validation(
                "update step requires a where predicate".to_string(),
            ));
        }
        if step.values.is_empty() {
            return Err(ExecuteError::Validation(
                "update step has no values".to_string(),
            ));
        }

        // Snapshot before mutating; rollback restores from this.
        let snapshot = ctx
            .store
            .select(ctx.user_id, &step.table, &step.where_)
            .await?;
        if snapshot.is_empty() {
            return Err(ExecuteError::NoMatch {
                table: step.table.clone(),
            });
        }

        let rows = ctx
            .store
            .update(ctx.user_id, &step.table, &step.where_, &step.values)
            .await?;

        Ok(StepOutcome {
            data: Json::Array(rows),
            compensation: Compensation::RestoreRows {
                table: step.table.clone(),
                rows: snapshot,
            },
        })
    }
}

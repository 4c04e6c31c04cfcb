//! Delete step: remove matching records, keeping their snapshot.

use async_trait::async_trait;
use serde_json::json;

use crate::error::ExecuteError;
use crate::step::{Compensation, StepContext, StepHandler, StepOutcome};
use crate::types::{ActionStep, StepType};

pub struct DeleteHandler;

#[async_trait]
impl StepHandler for DeleteHandler {
    fn step_type(&self) -> StepType {
        StepType::Delete
    }

    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
    ) -> Result<StepOutcome, ExecuteError> {
        if step.where_.is_empty() {
            return Err(ExecuteError::Validation(
                "delete step requires a where predicate".to_string(),
            ));
        }

        let rows = ctx
            .store
            .delete(ctx.user_id, &step.table, &step.where_)
            .await?;
        if rows.is_empty() {
            return Err(ExecuteError::NoMatch {
                table: step.table.clone(),
            });
        }

        Ok(StepOutcome {
            data: json!({ "deleted": rows.len() }),
            compensation: Compensation::ReinsertRows {
                table: step.table.clone(),
                rows,
            },
        })
    }
}

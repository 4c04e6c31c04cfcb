//! Select step: read-only lookup, usually to feed later steps via result_key.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::ExecuteError;
use crate::step::{Compensation, StepContext, StepHandler, StepOutcome};
use crate::types::{ActionStep, StepType};

pub struct SelectHandler;

#[async_trait]
impl StepHandler for SelectHandler {
    fn step_type(&self) -> StepType {
        StepType::Select
    }

    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
    ) -> Result<StepOutcome, ExecuteError> {
        let rows = ctx
            .store
            .select(ctx.user_id, &step.table, &step.where_)
            .await?;
        Ok(StepOutcome {
            data: Json::Array(rows),
            compensation: Compensation::None,
        })
    }
}

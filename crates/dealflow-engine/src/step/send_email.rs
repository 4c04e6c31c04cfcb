//! Send-email step: the one side effect that leaves the system boundary.

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use crate::error::ExecuteError;
use crate::step::{Compensation, StepContext, StepHandler, StepOutcome};
use crate::types::{ActionStep, StepType};

pub struct SendEmailHandler;

fn required_str<'a>(step: &'a ActionStep, key: &str) -> Result<&'a str, ExecuteError> {
    match step.values.get(key).and_then(Json::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ExecuteError::Validation(format!(
            "send_email step is missing \"{}\"",
            key
        ))),
    }
}

#[async_trait]
impl StepHandler for SendEmailHandler {
    fn step_type(&self) -> StepType {
        StepType::SendEmail
    }

    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
    ) -> Result<StepOutcome, ExecuteError> {
        let to = required_str(step, "to")?;
        let subject = required_str(step, "subject")?;
        let body = step
            .values
            .get("body")
            .and_then(Json::as_str)
            .unwrap_or_default();

        ctx.mailer
            .send(to, subject, body)
            .await
            .map_err(|e| ExecuteError::Mail(e.to_string()))?;

        Ok(StepOutcome {
            data: json!({ "to": to, "subject": subject, "delivered": true }),
            compensation: Compensation::Irreversible,
        })
    }
}

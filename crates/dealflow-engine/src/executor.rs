//! Plan execution: the saga loop.
//!
//! Steps run strictly in order. The first failure halts the plan, skips the
//! remainder, rolls back every applied step in reverse, and downgrades the
//! plan to `failed`. Before any step runs, the executor atomically claims
//! the plan's status so a plan can never execute twice, even under
//! concurrent requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use tracing::{error, info, warn};

use crate::error::ExecuteError;
use crate::plan::{PlanStore, StoredPlan};
use crate::resolve::resolve_map;
use crate::rollback::rollback;
use crate::step::{AppliedStep, StepContext, StepRegistry};
use crate::store::{DataStore, Mailer};
use crate::types::{
    ActionPlan, ActionPlanResult, ActionStep, ExecuteRequest, PlanRunStatus, PlanStatus,
    StepResult,
};

/// Executes approved plans against the data store and mailer.
pub struct PlanExecutor {
    store: Arc<dyn DataStore>,
    mailer: Arc<dyn Mailer>,
    plans: Arc<dyn PlanStore>,
    registry: StepRegistry,
    step_timeout: Duration,
}

impl PlanExecutor {
    pub fn new(
        store: Arc<dyn DataStore>,
        mailer: Arc<dyn Mailer>,
        plans: Arc<dyn PlanStore>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            store,
            mailer,
            plans,
            registry: StepRegistry::with_defaults(),
            step_timeout,
        }
    }

    pub fn from_config(
        store: Arc<dyn DataStore>,
        mailer: Arc<dyn Mailer>,
        plans: Arc<dyn PlanStore>,
        config: &dealflow_core::config::EngineConfig,
    ) -> Self {
        Self::new(
            store,
            mailer,
            plans,
            Duration::from_secs(config.step_timeout_seconds),
        )
    }

    /// Execute a plan. Never panics and never returns `Err`: every outcome,
    /// including refusals, is a structured result the caller can display.
    pub async fn execute(&self, request: &ExecuteRequest) -> ActionPlanResult {
        match self.try_execute(request).await {
            Ok(result) => result,
            Err(e) => {
                warn!(plan_id = %request.plan_id, error = %e, "Plan refused");
                ActionPlanResult {
                    status: PlanRunStatus::Error,
                    message: e.to_string(),
                    rolled_back: false,
                    failed_step: None,
                    data: None,
                    step_results: Vec::new(),
                }
            }
        }
    }

    async fn try_execute(&self, request: &ExecuteRequest) -> Result<ActionPlanResult, ExecuteError> {
        let stored = self.load_plan(request)?;
        self.check_runnable(&stored, request.plan_id)?;

        let mut plan = stored.plan;
        if plan.steps.is_empty() {
            return Err(ExecuteError::Validation("plan has no steps".to_string()));
        }
        apply_modifications(&mut plan, request)?;

        // Claim before the first side effect. Exactly one concurrent caller
        // wins; the rest see the plan as already executed.
        if !self
            .plans
            .claim(request.plan_id, stored.status, PlanStatus::Executed)?
        {
            return Err(ExecuteError::AlreadyExecuted(request.plan_id));
        }

        info!(
            plan_id = %request.plan_id,
            intent = %plan.intent,
            steps = plan.steps.len(),
            "Executing plan"
        );
        Ok(self.run_steps(&plan, &request.user_id).await)
    }

    fn load_plan(&self, request: &ExecuteRequest) -> Result<StoredPlan, ExecuteError> {
        match self.plans.get(request.plan_id)? {
            // Another user's plan is indistinguishable from a missing one.
            Some(stored) if stored.owner_id == request.user_id => Ok(stored),
            _ => Err(ExecuteError::PlanNotFound(request.plan_id)),
        }
    }

    fn check_runnable(&self, stored: &StoredPlan, plan_id: uuid::Uuid) -> Result<(), ExecuteError> {
        match stored.status {
            PlanStatus::Executed | PlanStatus::Failed => {
                Err(ExecuteError::AlreadyExecuted(plan_id))
            }
            PlanStatus::Rejected => Err(ExecuteError::NotApproved(plan_id)),
            PlanStatus::Pending if stored.plan.needs_confirmation => {
                Err(ExecuteError::NotApproved(plan_id))
            }
            PlanStatus::Pending | PlanStatus::Approved => Ok(()),
        }
    }

    async fn run_steps(&self, plan: &ActionPlan, user_id: &str) -> ActionPlanResult {
        let ctx = StepContext {
            user_id,
            store: self.store.as_ref(),
            mailer: self.mailer.as_ref(),
        };

        let mut captured: HashMap<String, Json> = HashMap::new();
        let mut applied: Vec<AppliedStep> = Vec::new();
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut last_data: Option<Json> = None;

        for (index, step) in plan.steps.iter().enumerate() {
            match self.run_step(&ctx, step, &captured).await {
                Ok(outcome) => {
                    if let Some(key) = &step.result_key {
                        captured.insert(key.clone(), outcome.data.clone());
                    }
                    applied.push(AppliedStep {
                        index,
                        compensation: outcome.compensation,
                    });
                    if !is_empty_data(&outcome.data) {
                        last_data = Some(outcome.data.clone());
                    }
                    step_results.push(StepResult::success(index, step, outcome.data));
                }
                Err(e) => {
                    error!(
                        plan_id = %plan.plan_id,
                        step = index,
                        error = %e,
                        "Step failed, rolling back"
                    );
                    step_results.push(StepResult::error(index, step, e.to_string()));
                    for (skip_index, skipped) in
                        plan.steps.iter().enumerate().skip(index + 1)
                    {
                        step_results.push(StepResult::skipped(skip_index, skipped));
                    }
                    return self
                        .halt(plan, index, &e, applied, step_results, user_id)
                        .await;
                }
            }
        }

        ActionPlanResult {
            status: PlanRunStatus::Success,
            message: format!("Completed {} step(s)", plan.steps.len()),
            rolled_back: false,
            failed_step: None,
            data: last_data,
            step_results,
        }
    }

    async fn run_step(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
        captured: &HashMap<String, Json>,
    ) -> Result<crate::step::StepOutcome, ExecuteError> {
        let resolved = ActionStep {
            step_type: step.step_type,
            table: step.table.clone(),
            where_: resolve_map(&step.where_, captured)?,
            values: resolve_map(&step.values, captured)?,
            notes: step.notes.clone(),
            result_key: step.result_key.clone(),
        };

        let handler = self.registry.get(step.step_type).ok_or_else(|| {
            ExecuteError::Validation(format!("no handler for step type {}", step.step_type))
        })?;

        match tokio::time::timeout(self.step_timeout, handler.execute(ctx, &resolved)).await {
            Ok(result) => result,
            Err(_) => Err(ExecuteError::Timeout(self.step_timeout.as_secs())),
        }
    }

    /// A step failed: compensate applied steps and downgrade the plan.
    async fn halt(
        &self,
        plan: &ActionPlan,
        failed_index: usize,
        cause: &ExecuteError,
        applied: Vec<AppliedStep>,
        step_results: Vec<StepResult>,
        user_id: &str,
    ) -> ActionPlanResult {
        let outcome = rollback(self.store.as_ref(), user_id, &applied).await;

        if let Err(e) = self
            .plans
            .set_status(plan.plan_id, PlanStatus::Failed)
        {
            error!(plan_id = %plan.plan_id, error = %e, "Failed to mark plan as failed");
        }

        // A compensation failure leaves the store needing manual remediation:
        // that is an error outcome, not a rolled-back one.
        let rolled_back = !applied.is_empty() && outcome.clean();
        let status = if rolled_back {
            PlanRunStatus::RolledBack
        } else {
            PlanRunStatus::Error
        };
        let mut message = format!("Step {} failed: {}", failed_index + 1, cause);
        if rolled_back {
            message.push_str(&format!(
                ". Rolled back {} applied step(s)",
                outcome.undone
            ));
        } else if let Some((index, compensation_error)) = outcome.failures.first() {
            message.push_str(&format!(
                ". Rollback incomplete ({} of {} compensation(s) failed); step {} compensation failed: {}",
                outcome.failures.len(),
                outcome.attempted,
                index + 1,
                compensation_error
            ));
        }

        ActionPlanResult {
            status,
            message,
            rolled_back,
            failed_step: Some(failed_index),
            data: None,
            step_results,
        }
    }
}

/// An empty select result or bare object carries nothing worth surfacing
/// as the plan's aggregate data.
fn is_empty_data(data: &Json) -> bool {
    match data {
        Json::Null => true,
        Json::Array(items) => items.is_empty(),
        Json::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Merge human edits from the confirmation UI into the plan's steps.
fn apply_modifications(
    plan: &mut ActionPlan,
    request: &ExecuteRequest,
) -> Result<(), ExecuteError> {
    let step_count = plan.steps.len();
    for modification in &request.modifications {
        let step = plan.steps.get_mut(modification.step_index).ok_or_else(|| {
            ExecuteError::Validation(format!(
                "modification targets step {} but the plan has {} step(s)",
                modification.step_index, step_count
            ))
        })?;
        for (k, v) in &modification.values {
            step.values.insert(k.clone(), v.clone());
        }
        for (k, v) in &modification.where_ {
            step.where_.insert(k.clone(), v.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MemoryPlanStore;
    use crate::store::{MemoryStore, RecordingMailer};
    use crate::types::{Intent, StepModification, StepType};
    use async_trait::async_trait;
    use dealflow_core::error::DealflowError;
    use dealflow_core::types::JsonMap;
    use serde_json::json;
    use uuid::Uuid;

    /// Store whose deletes always fail, so an insert's compensation cannot
    /// run even though the forward insert succeeded.
    struct NoDeleteStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl DataStore for NoDeleteStore {
        async fn insert(
            &self,
            user_id: &str,
            table: &str,
            values: &JsonMap,
        ) -> Result<Json, DealflowError> {
            self.inner.insert(user_id, table, values).await
        }

        async fn update(
            &self,
            user_id: &str,
            table: &str,
            filter: &JsonMap,
            values: &JsonMap,
        ) -> Result<Vec<Json>, DealflowError> {
            self.inner.update(user_id, table, filter, values).await
        }

        async fn delete(
            &self,
            _user_id: &str,
            _table: &str,
            _filter: &JsonMap,
        ) -> Result<Vec<Json>, DealflowError> {
            Err(DealflowError::Storage("delete refused".to_string()))
        }

        async fn select(
            &self,
            user_id: &str,
            table: &str,
            filter: &JsonMap,
        ) -> Result<Vec<Json>, DealflowError> {
            self.inner.select(user_id, table, filter).await
        }
    }

    /// Mailer that never completes, for exercising the per-step timeout.
    struct HangingMailer;

    #[async_trait]
    impl Mailer for HangingMailer {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), DealflowError> {
            std::future::pending().await
        }
    }

    fn map(value: Json) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    fn step(step_type: StepType, table: &str, where_: Json, values: Json) -> ActionStep {
        ActionStep {
            step_type,
            table: table.to_string(),
            where_: map(where_),
            values: map(values),
            notes: None,
            result_key: None,
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        plans: Arc<MemoryPlanStore>,
        executor: PlanExecutor,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let plans = Arc::new(MemoryPlanStore::new());
        let executor = PlanExecutor::new(
            store.clone(),
            mailer.clone(),
            plans.clone(),
            Duration::from_secs(30),
        );
        Harness {
            store,
            mailer,
            plans,
            executor,
        }
    }

    fn save_plan(h: &Harness, plan: ActionPlan, status: PlanStatus) -> Uuid {
        let id = plan.plan_id;
        h.plans
            .save(&StoredPlan {
                plan,
                owner_id: "user-1".to_string(),
                status,
            })
            .unwrap();
        id
    }

    fn request(plan_id: Uuid) -> ExecuteRequest {
        ExecuteRequest {
            plan_id,
            user_id: "user-1".to_string(),
            modifications: Vec::new(),
        }
    }

    fn plan_with_steps(intent: Intent, steps: Vec<ActionStep>) -> ActionPlan {
        ActionPlan::new(Uuid::new_v4(), intent, 0.9, JsonMap::new(), steps)
    }

    #[tokio::test]
    async fn test_successful_plan_runs_all_steps() {
        let h = harness();
        let mut insert = step(
            StepType::Insert,
            "clients",
            json!({}),
            json!({"client_name": "Acme", "stage": "lead"}),
        );
        insert.result_key = Some("new_client".to_string());
        let activity = step(
            StepType::Insert,
            "activities",
            json!({}),
            json!({"client_id": "{{new_client.id}}", "summary": "Created"}),
        );
        let id = save_plan(
            &h,
            plan_with_steps(Intent::CreateClient, vec![insert, activity]),
            PlanStatus::Pending,
        );

        let result = h.executor.execute(&request(id)).await;

        assert_eq!(result.status, PlanRunStatus::Success);
        assert!(!result.rolled_back);
        assert_eq!(result.step_results.len(), 2);

        // The reference resolved to the first step's generated id.
        let clients = h.store.rows("user-1", "clients");
        let activities = h.store.rows("user-1", "activities");
        assert_eq!(activities[0]["client_id"], clients[0]["id"]);

        // The plan is now executed and cannot run again.
        let again = h.executor.execute(&request(id)).await;
        assert_eq!(again.status, PlanRunStatus::Error);
        assert!(again.message.contains("already been executed"));
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_marks_failed() {
        let h = harness();
        h.store.fail_table("activities");
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![
                    step(StepType::Insert, "clients", json!({}), json!({"client_name": "Acme"})),
                    step(StepType::Insert, "contacts", json!({}), json!({"name": "Ana"})),
                    step(StepType::Insert, "activities", json!({}), json!({"summary": "x"})),
                    step(StepType::Insert, "reminders", json!({}), json!({"title": "y"})),
                    step(StepType::Insert, "schedules", json!({}), json!({"title": "z"})),
                ],
            ),
            PlanStatus::Pending,
        );

        let result = h.executor.execute(&request(id)).await;

        assert_eq!(result.status, PlanRunStatus::RolledBack);
        assert!(result.rolled_back);
        assert_eq!(result.failed_step, Some(2));
        assert!(result.message.contains("Step 3 failed"));
        assert_eq!(result.step_results.len(), 5);

        use crate::types::StepStatus;
        let statuses: Vec<StepStatus> = result.step_results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Success,
                StepStatus::Success,
                StepStatus::Error,
                StepStatus::Skipped,
                StepStatus::Skipped,
            ]
        );

        // Both applied inserts were compensated.
        assert!(h.store.rows("user-1", "clients").is_empty());
        assert!(h.store.rows("user-1", "contacts").is_empty());
        assert_eq!(
            h.plans.get(id).unwrap().unwrap().status,
            PlanStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_first_step_failure_is_error_not_rolled_back() {
        let h = harness();
        h.store.fail_table("clients");
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![step(StepType::Insert, "clients", json!({}), json!({"client_name": "A"}))],
            ),
            PlanStatus::Pending,
        );

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(!result.rolled_back);
        assert_eq!(result.failed_step, Some(0));
    }

    #[tokio::test]
    async fn test_pending_plan_needing_confirmation_is_refused() {
        let h = harness();
        let mut plan = plan_with_steps(
            Intent::DeleteClient,
            vec![step(StepType::Delete, "clients", json!({"client_name": "A"}), json!({}))],
        );
        plan.needs_confirmation = true;
        let id = save_plan(&h, plan, PlanStatus::Pending);

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(result.message.contains("requires confirmation"));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_approved_plan_with_confirmation_runs() {
        let h = harness();
        h.store
            .insert("user-1", "clients", &map(json!({"client_name": "A"})))
            .await
            .unwrap();
        let mut plan = plan_with_steps(
            Intent::DeleteClient,
            vec![step(StepType::Delete, "clients", json!({"client_name": "A"}), json!({}))],
        );
        plan.needs_confirmation = true;
        let id = save_plan(&h, plan, PlanStatus::Approved);

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::Success);
        assert!(h.store.rows("user-1", "clients").is_empty());
    }

    #[tokio::test]
    async fn test_rejected_plan_is_refused() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![step(StepType::Insert, "clients", json!({}), json!({"client_name": "A"}))],
            ),
            PlanStatus::Rejected,
        );

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(result.message.contains("requires confirmation"));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_unknown_plan_and_wrong_owner() {
        let h = harness();
        let result = h.executor.execute(&request(Uuid::new_v4())).await;
        assert!(result.message.contains("Plan not found"));

        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![step(StepType::Insert, "clients", json!({}), json!({"client_name": "A"}))],
            ),
            PlanStatus::Pending,
        );
        let mut req = request(id);
        req.user_id = "intruder".to_string();
        let result = h.executor.execute(&req).await;
        assert!(result.message.contains("Plan not found"));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_empty_plan_is_invalid() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(Intent::CreateClient, vec![]),
            PlanStatus::Pending,
        );
        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(result.message.contains("no steps"));
        // The plan was not claimed; it stays pending.
        assert_eq!(h.plans.get(id).unwrap().unwrap().status, PlanStatus::Pending);
    }

    #[tokio::test]
    async fn test_unresolved_reference_fails_the_step() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::LogActivity,
                vec![step(
                    StepType::Insert,
                    "activities",
                    json!({}),
                    json!({"client_id": "{{ghost.id}}", "summary": "x"}),
                )],
            ),
            PlanStatus::Pending,
        );

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(result.message.contains("Unresolved reference"));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_modifications_are_merged_before_execution() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![step(
                    StepType::Insert,
                    "clients",
                    json!({}),
                    json!({"client_name": "Acme", "stage": "lead"}),
                )],
            ),
            PlanStatus::Pending,
        );

        let mut req = request(id);
        req.modifications = vec![StepModification {
            step_index: 0,
            values: map(json!({"stage": "contacted"})),
            where_: JsonMap::new(),
        }];
        let result = h.executor.execute(&req).await;

        assert_eq!(result.status, PlanRunStatus::Success);
        let rows = h.store.rows("user-1", "clients");
        assert_eq!(rows[0]["stage"], "contacted");
        assert_eq!(rows[0]["client_name"], "Acme");
    }

    #[tokio::test]
    async fn test_out_of_range_modification_is_refused() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![step(StepType::Insert, "clients", json!({}), json!({"client_name": "A"}))],
            ),
            PlanStatus::Pending,
        );

        let mut req = request(id);
        req.modifications = vec![StepModification {
            step_index: 5,
            values: JsonMap::new(),
            where_: JsonMap::new(),
        }];
        let result = h.executor.execute(&req).await;
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(result.message.contains("modification targets step 5"));
        assert_eq!(h.store.writes(), 0);
    }

    #[tokio::test]
    async fn test_send_email_after_insert_failure_keeps_mail_unsent() {
        let h = harness();
        h.store.fail_table("activities");
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::SendEmail,
                vec![
                    step(StepType::Insert, "activities", json!({}), json!({"summary": "x"})),
                    step(
                        StepType::SendEmail,
                        "mail",
                        json!({}),
                        json!({"to": "a@b.test", "subject": "Hi"}),
                    ),
                ],
            ),
            PlanStatus::Approved,
        );

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.failed_step, Some(0));
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_mail_sent_before_failure_is_reported_not_undone() {
        let h = harness();
        h.store.fail_table("activities");
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::SendEmail,
                vec![
                    step(
                        StepType::SendEmail,
                        "mail",
                        json!({}),
                        json!({"to": "a@b.test", "subject": "Hi"}),
                    ),
                    step(StepType::Insert, "activities", json!({}), json!({"summary": "x"})),
                ],
            ),
            PlanStatus::Approved,
        );

        let result = h.executor.execute(&request(id)).await;
        assert_eq!(result.status, PlanRunStatus::RolledBack);
        // The mail left the system; rollback cannot recall it.
        assert_eq!(h.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_execution_runs_once() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![step(StepType::Insert, "clients", json!({}), json!({"client_name": "A"}))],
            ),
            PlanStatus::Pending,
        );

        let store = h.store.clone();
        let mailer = h.mailer.clone();
        let plans = h.plans.clone();
        let executor2 = PlanExecutor::new(store, mailer, plans, Duration::from_secs(30));

        let req = request(id);
        let (a, b) = tokio::join!(h.executor.execute(&req), executor2.execute(&req));

        let successes = [&a, &b]
            .iter()
            .filter(|r| r.status == PlanRunStatus::Success)
            .count();
        assert_eq!(successes, 1);
        assert_eq!(h.store.rows("user-1", "clients").len(), 1);
    }

    #[tokio::test]
    async fn test_compensation_failure_reports_dirty_rollback() {
        let inner = Arc::new(MemoryStore::new());
        inner.fail_table("activities");
        let plans = Arc::new(MemoryPlanStore::new());
        let executor = PlanExecutor::new(
            Arc::new(NoDeleteStore {
                inner: inner.clone(),
            }),
            Arc::new(RecordingMailer::new()),
            plans.clone(),
            Duration::from_secs(30),
        );

        let plan = plan_with_steps(
            Intent::CreateClient,
            vec![
                step(StepType::Insert, "clients", json!({}), json!({"client_name": "Acme"})),
                step(StepType::Insert, "activities", json!({}), json!({"summary": "x"})),
            ],
        );
        let id = plan.plan_id;
        plans
            .save(&StoredPlan {
                plan,
                owner_id: "user-1".to_string(),
                status: PlanStatus::Pending,
            })
            .unwrap();

        let result = executor.execute(&request(id)).await;

        // Compensation could not undo the first insert: the run is an error,
        // not a rollback, and the message carries both failures.
        assert_eq!(result.status, PlanRunStatus::Error);
        assert!(!result.rolled_back);
        assert_eq!(result.failed_step, Some(1));
        assert!(result.message.contains("Step 2 failed"));
        assert!(result
            .message
            .contains("Rollback incomplete (1 of 1 compensation(s) failed)"));
        assert!(result.message.contains("step 1 compensation failed"));
        assert!(result.message.contains("delete refused"));

        // The orphaned row is left in place for manual remediation.
        assert_eq!(inner.rows("user-1", "clients").len(), 1);
        assert_eq!(plans.get(id).unwrap().unwrap().status, PlanStatus::Failed);
    }

    #[tokio::test]
    async fn test_timed_out_step_fails_and_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        let plans = Arc::new(MemoryPlanStore::new());
        let executor = PlanExecutor::new(
            store.clone(),
            Arc::new(HangingMailer),
            plans.clone(),
            Duration::from_millis(100),
        );

        let plan = plan_with_steps(
            Intent::SendEmail,
            vec![
                step(StepType::Insert, "clients", json!({}), json!({"client_name": "Acme"})),
                step(
                    StepType::SendEmail,
                    "mail",
                    json!({}),
                    json!({"to": "a@b.test", "subject": "Hi"}),
                ),
            ],
        );
        let id = plan.plan_id;
        plans
            .save(&StoredPlan {
                plan,
                owner_id: "user-1".to_string(),
                status: PlanStatus::Approved,
            })
            .unwrap();

        let result = executor.execute(&request(id)).await;

        assert_eq!(result.status, PlanRunStatus::RolledBack);
        assert!(result.rolled_back);
        assert_eq!(result.failed_step, Some(1));
        assert!(result.message.contains("timed out"));
        // The insert that preceded the hung step was compensated.
        assert!(store.rows("user-1", "clients").is_empty());
        assert_eq!(plans.get(id).unwrap().unwrap().status, PlanStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_trailing_result_does_not_clobber_plan_data() {
        let h = harness();
        let id = save_plan(
            &h,
            plan_with_steps(
                Intent::CreateClient,
                vec![
                    step(
                        StepType::Insert,
                        "clients",
                        json!({}),
                        json!({"client_name": "Acme"}),
                    ),
                    step(StepType::Select, "contacts", json!({"name": "Nobody"}), json!({})),
                ],
            ),
            PlanStatus::Pending,
        );

        let result = h.executor.execute(&request(id)).await;

        assert_eq!(result.status, PlanRunStatus::Success);
        // The final select matched nothing; the aggregate data stays the
        // last step output that carried anything.
        let data = result.data.unwrap();
        assert_eq!(data["client_name"], "Acme");
    }
}

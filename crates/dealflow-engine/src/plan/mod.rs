//! Plan intake, review, and lifecycle management.
//!
//! `PlanService` is the front door for plans arriving from the upstream
//! interpreter: it runs duplicate detection and risk evaluation, persists
//! the assessed plan as `pending`, and handles the human review verbs
//! (approve, reject, amend). Execution is the executor's job.

mod state_machine;

pub use state_machine::validate_transition;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;
use uuid::Uuid;

use dealflow_core::error::DealflowError;
use dealflow_core::types::JsonMap;

use crate::duplicate::DuplicateDetector;
use crate::error::PlanError;
use crate::risk;
use crate::store::DataStore;
use crate::types::{ActionPlan, PlanStatus};

/// A plan at rest, with its owner and lifecycle status.
#[derive(Debug, Clone)]
pub struct StoredPlan {
    pub plan: ActionPlan,
    pub owner_id: String,
    pub status: PlanStatus,
}

/// Persistence contract for plans.
///
/// `claim` must be atomic with respect to concurrent claims of the same
/// plan: exactly one caller observes `true`.
pub trait PlanStore: Send + Sync {
    fn save(&self, stored: &StoredPlan) -> Result<(), DealflowError>;
    fn get(&self, plan_id: Uuid) -> Result<Option<StoredPlan>, DealflowError>;
    fn set_status(&self, plan_id: Uuid, status: PlanStatus) -> Result<(), DealflowError>;
    fn claim(
        &self,
        plan_id: Uuid,
        expected: PlanStatus,
        next: PlanStatus,
    ) -> Result<bool, DealflowError>;
    /// Replace the plan body after re-assessment.
    fn update_plan(&self, plan: &ActionPlan) -> Result<(), DealflowError>;
}

/// In-memory `PlanStore`.
#[derive(Default)]
pub struct MemoryPlanStore {
    plans: Mutex<HashMap<Uuid, StoredPlan>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanStore for MemoryPlanStore {
    fn save(&self, stored: &StoredPlan) -> Result<(), DealflowError> {
        let mut plans = self.plans.lock().map_err(lock_poisoned)?;
        if plans.contains_key(&stored.plan.plan_id) {
            return Err(DealflowError::Storage(format!(
                "plan {} already exists",
                stored.plan.plan_id
            )));
        }
        plans.insert(stored.plan.plan_id, stored.clone());
        Ok(())
    }

    fn get(&self, plan_id: Uuid) -> Result<Option<StoredPlan>, DealflowError> {
        let plans = self.plans.lock().map_err(lock_poisoned)?;
        Ok(plans.get(&plan_id).cloned())
    }

    fn set_status(&self, plan_id: Uuid, status: PlanStatus) -> Result<(), DealflowError> {
        let mut plans = self.plans.lock().map_err(lock_poisoned)?;
        let stored = plans
            .get_mut(&plan_id)
            .ok_or_else(|| DealflowError::Storage(format!("plan not found: {}", plan_id)))?;
        stored.status = status;
        Ok(())
    }

    fn claim(
        &self,
        plan_id: Uuid,
        expected: PlanStatus,
        next: PlanStatus,
    ) -> Result<bool, DealflowError> {
        // Atomicity comes from holding the table lock across test-and-set.
        let mut plans = self.plans.lock().map_err(lock_poisoned)?;
        match plans.get_mut(&plan_id) {
            Some(stored) if stored.status == expected => {
                stored.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn update_plan(&self, plan: &ActionPlan) -> Result<(), DealflowError> {
        let mut plans = self.plans.lock().map_err(lock_poisoned)?;
        let stored = plans
            .get_mut(&plan.plan_id)
            .ok_or_else(|| DealflowError::Storage(format!("plan not found: {}", plan.plan_id)))?;
        stored.plan = plan.clone();
        Ok(())
    }
}

fn lock_poisoned<T>(_: std::sync::PoisonError<T>) -> DealflowError {
    DealflowError::Storage("plan store lock poisoned".to_string())
}

/// Intake and review service for plans.
pub struct PlanService {
    data: Arc<dyn DataStore>,
    plans: Arc<dyn PlanStore>,
    detector: DuplicateDetector,
}

impl PlanService {
    pub fn new(data: Arc<dyn DataStore>, plans: Arc<dyn PlanStore>, detector: DuplicateDetector) -> Self {
        Self {
            data,
            plans,
            detector,
        }
    }

    /// Assess an incoming plan and persist it as `pending`.
    ///
    /// Returns the plan with its derived review properties filled in, so the
    /// caller can surface the confirmation prompt immediately.
    pub async fn intake(&self, user_id: &str, mut plan: ActionPlan) -> Result<ActionPlan, PlanError> {
        let duplicates = self
            .detector
            .find_candidates(self.data.as_ref(), user_id, &plan.entities)
            .await?;
        let assessment = risk::evaluate(plan.intent, &plan.entities, &plan.steps, &duplicates);
        plan.apply_assessment(assessment, duplicates);

        self.plans.save(&StoredPlan {
            plan: plan.clone(),
            owner_id: user_id.to_string(),
            status: PlanStatus::Pending,
        })?;
        info!(
            plan_id = %plan.plan_id,
            intent = %plan.intent,
            needs_confirmation = plan.needs_confirmation,
            "Plan received"
        );
        Ok(plan)
    }

    /// Fetch one of the user's plans.
    pub fn get(&self, user_id: &str, plan_id: Uuid) -> Result<StoredPlan, PlanError> {
        self.load_owned(user_id, plan_id)
    }

    /// Record human approval of a pending plan.
    pub fn approve(&self, user_id: &str, plan_id: Uuid) -> Result<(), PlanError> {
        self.transition(user_id, plan_id, PlanStatus::Approved)
    }

    /// Record human rejection of a pending plan.
    pub fn reject(&self, user_id: &str, plan_id: Uuid) -> Result<(), PlanError> {
        self.transition(user_id, plan_id, PlanStatus::Rejected)
    }

    /// Merge edited entities into a pending plan and re-assess it.
    ///
    /// Risk flags and duplicate candidates are derived state, so any change
    /// to the entities recomputes them from scratch.
    pub async fn amend_entities(
        &self,
        user_id: &str,
        plan_id: Uuid,
        entities: JsonMap,
    ) -> Result<ActionPlan, PlanError> {
        let stored = self.load_owned(user_id, plan_id)?;
        if stored.status != PlanStatus::Pending {
            return Err(PlanError::InvalidTransition(stored.status, PlanStatus::Pending));
        }

        let mut plan = stored.plan;
        for (k, v) in entities {
            plan.entities.insert(k, v);
        }

        let duplicates = self
            .detector
            .find_candidates(self.data.as_ref(), user_id, &plan.entities)
            .await?;
        let assessment = risk::evaluate(plan.intent, &plan.entities, &plan.steps, &duplicates);
        plan.apply_assessment(assessment, duplicates);

        self.plans.update_plan(&plan)?;
        Ok(plan)
    }

    fn transition(&self, user_id: &str, plan_id: Uuid, to: PlanStatus) -> Result<(), PlanError> {
        let stored = self.load_owned(user_id, plan_id)?;
        validate_transition(stored.status, to)?;
        self.plans.set_status(plan_id, to)?;
        info!(plan_id = %plan_id, status = %to, "Plan status changed");
        Ok(())
    }

    fn load_owned(&self, user_id: &str, plan_id: Uuid) -> Result<StoredPlan, PlanError> {
        match self.plans.get(plan_id)? {
            // Another user's plan is indistinguishable from a missing one.
            Some(stored) if stored.owner_id == user_id => Ok(stored),
            _ => Err(PlanError::NotFound(plan_id)),
        }
    }
}

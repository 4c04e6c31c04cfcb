//! Step handlers: one per step type, dispatched by the executor.
//!
//! Each handler performs exactly one operation against a collaborator and
//! reports, together with its output, the compensation that would undo it.
//! Compensation is recorded before the plan continues, so the rollback
//! coordinator never has to reconstruct prior state after the fact.

mod delete;
mod insert;
mod select;
mod send_email;
mod update;

pub use delete::DeleteHandler;
pub use insert::InsertHandler;
pub use select::SelectHandler;
pub use send_email::SendEmailHandler;
pub use update::UpdateHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::ExecuteError;
use crate::store::{DataStore, Mailer};
use crate::types::{ActionStep, StepType};

/// Collaborators a handler may touch, scoped to the acting user.
pub struct StepContext<'a> {
    pub user_id: &'a str,
    pub store: &'a dyn DataStore,
    pub mailer: &'a dyn Mailer,
}

/// How to undo one applied step.
///
/// `RestoreRows` and `ReinsertRows` carry pre-mutation snapshots taken by the
/// handler itself, inside the same step.
#[derive(Debug, Clone, PartialEq)]
pub enum Compensation {
    /// Delete the record an insert created.
    DeleteInserted { table: String, record_id: String },
    /// Write the snapshotted field values back over the updated rows.
    RestoreRows { table: String, rows: Vec<Json> },
    /// Re-insert the deleted rows with their original ids.
    ReinsertRows { table: String, rows: Vec<Json> },
    /// The side effect left the system boundary and cannot be undone.
    Irreversible,
    /// Read-only step.
    None,
}

/// A handler's output: the data later steps may reference, and how to undo
/// the side effect.
#[derive(Debug)]
pub struct StepOutcome {
    pub data: Json,
    pub compensation: Compensation,
}

/// A successfully applied step, remembered for possible rollback.
#[derive(Debug, Clone)]
pub struct AppliedStep {
    pub index: usize,
    pub compensation: Compensation,
}

/// One step type's execution strategy.
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn step_type(&self) -> StepType;

    /// Run the step. The `step` passed in already has its references
    /// resolved and any human modifications merged.
    async fn execute(
        &self,
        ctx: &StepContext<'_>,
        step: &ActionStep,
    ) -> Result<StepOutcome, ExecuteError>;
}

/// Dispatch table from step type to handler.
pub struct StepRegistry {
    handlers: HashMap<StepType, Arc<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with all built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InsertHandler));
        registry.register(Arc::new(UpdateHandler));
        registry.register(Arc::new(DeleteHandler));
        registry.register(Arc::new(SelectHandler));
        registry.register(Arc::new(SendEmailHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler.step_type(), handler);
    }

    pub fn get(&self, step_type: StepType) -> Option<Arc<dyn StepHandler>> {
        self.handlers.get(&step_type).cloned()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_step_types() {
        let registry = StepRegistry::with_defaults();
        for step_type in [
            StepType::Insert,
            StepType::Update,
            StepType::Delete,
            StepType::Select,
            StepType::SendEmail,
        ] {
            let handler = registry.get(step_type).unwrap();
            assert_eq!(handler.step_type(), step_type);
        }
    }

    #[test]
    fn test_empty_registry_has_no_handlers() {
        let registry = StepRegistry::new();
        assert!(registry.get(StepType::Insert).is_none());
    }
}

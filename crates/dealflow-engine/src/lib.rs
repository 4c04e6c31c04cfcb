//! Action-plan execution engine.
//!
//! Plans arrive from an upstream interpreter as structured, reviewable
//! proposals. This crate assesses them (duplicate detection, risk flags,
//! confirmation gating), manages their lifecycle, and executes approved
//! plans as sagas: ordered steps, halt on first failure, reverse-order
//! compensation of everything already applied.

pub mod duplicate;
pub mod error;
pub mod executor;
pub mod plan;
pub mod resolve;
pub mod risk;
pub mod rollback;
pub mod sqlite;
pub mod step;
pub mod store;
pub mod types;

pub use duplicate::DuplicateDetector;
pub use error::{DetectError, ExecuteError, PlanError};
pub use executor::PlanExecutor;
pub use plan::{MemoryPlanStore, PlanService, PlanStore, StoredPlan};
pub use risk::RiskAssessment;
pub use sqlite::{SqlitePlanStore, SqliteStore};
pub use step::{Compensation, StepHandler, StepRegistry};
pub use store::{DataStore, Mailer, MemoryStore, RecordingMailer};
pub use types::{
    ActionPlan, ActionPlanResult, ActionStep, DuplicateCandidate, ExecuteRequest, Intent,
    PipelineStage, PlanRunStatus, PlanStatus, RiskFlag, Similarity, StepModification, StepResult,
    StepStatus, StepType,
};

//! Error types for the action-plan engine.

use crate::types::PlanStatus;
use dealflow_core::error::DealflowError;
use uuid::Uuid;

/// Errors from plan execution.
///
/// Fail-fast variants (`PlanNotFound`, `NotApproved`, `AlreadyExecuted`,
/// `Validation`) mean no step ran. The rest surface as step-level failures
/// inside the structured `ActionPlanResult`.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),
    #[error("Plan {0} requires confirmation and has not been approved")]
    NotApproved(Uuid),
    #[error("Plan {0} has already been executed")]
    AlreadyExecuted(Uuid),
    #[error("Invalid plan: {0}")]
    Validation(String),
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("No rows matched the predicate on {table}")]
    NoMatch { table: String },
    #[error("Step timed out after {0} seconds")]
    Timeout(u64),
    #[error("Mail delivery failed: {0}")]
    Mail(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DealflowError),
}

/// Errors from plan lifecycle management.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid plan transition: {0} -> {1}")]
    InvalidTransition(PlanStatus, PlanStatus),
    #[error("Duplicate detection failed: {0}")]
    Detection(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DealflowError),
}

/// Errors from duplicate detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Duplicate detection failed: {0}")]
    DetectionFailed(String),
    #[error("Storage error: {0}")]
    Storage(#[from] DealflowError),
}

impl From<DetectError> for PlanError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Storage(e) => PlanError::Storage(e),
            other => PlanError::Detection(other.to_string()),
        }
    }
}

//! Core types and value objects for the action-plan engine.
//!
//! Defines plans, steps, their results, and the supporting enumerations.

use dealflow_core::types::{JsonMap, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Business operations the upstream interpreter can propose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateClient,
    UpdateClient,
    DeleteClient,
    AddContact,
    LogActivity,
    MoveStage,
    CreateSchedule,
    UpdateSchedule,
    DeleteSchedule,
    CreateReminder,
    DraftEmail,
    SendEmail,
    CreateProposal,
    AttachDocument,
}

impl Intent {
    /// Intents that always require human confirmation, independent of risk
    /// flags or missing fields.
    pub fn always_confirm(&self) -> bool {
        matches!(
            self,
            Intent::DeleteClient | Intent::DeleteSchedule | Intent::SendEmail
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::CreateClient => "create_client",
            Intent::UpdateClient => "update_client",
            Intent::DeleteClient => "delete_client",
            Intent::AddContact => "add_contact",
            Intent::LogActivity => "log_activity",
            Intent::MoveStage => "move_stage",
            Intent::CreateSchedule => "create_schedule",
            Intent::UpdateSchedule => "update_schedule",
            Intent::DeleteSchedule => "delete_schedule",
            Intent::CreateReminder => "create_reminder",
            Intent::DraftEmail => "draft_email",
            Intent::SendEmail => "send_email",
            Intent::CreateProposal => "create_proposal",
            Intent::AttachDocument => "attach_document",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_client" => Ok(Intent::CreateClient),
            "update_client" => Ok(Intent::UpdateClient),
            "delete_client" => Ok(Intent::DeleteClient),
            "add_contact" => Ok(Intent::AddContact),
            "log_activity" => Ok(Intent::LogActivity),
            "move_stage" => Ok(Intent::MoveStage),
            "create_schedule" => Ok(Intent::CreateSchedule),
            "update_schedule" => Ok(Intent::UpdateSchedule),
            "delete_schedule" => Ok(Intent::DeleteSchedule),
            "create_reminder" => Ok(Intent::CreateReminder),
            "draft_email" => Ok(Intent::DraftEmail),
            "send_email" => Ok(Intent::SendEmail),
            "create_proposal" => Ok(Intent::CreateProposal),
            "attach_document" => Ok(Intent::AttachDocument),
            _ => Err(format!("Unknown intent: {}", s)),
        }
    }
}

/// Closed set of reasons a plan may need human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    DuplicateClient,
    UnknownStage,
    MissingDate,
    SendEmailRisk,
    DeleteRisk,
    HighValueChange,
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskFlag::DuplicateClient => "duplicate_client",
            RiskFlag::UnknownStage => "unknown_stage",
            RiskFlag::MissingDate => "missing_date",
            RiskFlag::SendEmailRisk => "send_email_risk",
            RiskFlag::DeleteRisk => "delete_risk",
            RiskFlag::HighValueChange => "high_value_change",
        };
        write!(f, "{}", s)
    }
}

/// One atomic operation kind within a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Insert,
    Update,
    Delete,
    Select,
    SendEmail,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepType::Insert => "insert",
            StepType::Update => "update",
            StepType::Delete => "delete",
            StepType::Select => "select",
            StepType::SendEmail => "send_email",
        };
        write!(f, "{}", s)
    }
}

/// Plan lifecycle states.
///
/// `Executed`, `Rejected`, and `Failed` are terminal for execution purposes:
/// the executor refuses to run a plan in any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Approved => "approved",
            PlanStatus::Rejected => "rejected",
            PlanStatus::Executed => "executed",
            PlanStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PlanStatus::Pending),
            "approved" => Ok(PlanStatus::Approved),
            "rejected" => Ok(PlanStatus::Rejected),
            "executed" => Ok(PlanStatus::Executed),
            "failed" => Ok(PlanStatus::Failed),
            _ => Err(format!("Unknown plan status: {}", s)),
        }
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
    Skipped,
}

/// Outcome of a whole plan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanRunStatus {
    Success,
    Error,
    RolledBack,
}

/// Similarity descriptor for duplicate candidates.
///
/// A descriptor, not a raw score, so callers stay stable across
/// comparison-algorithm changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    High,
    Medium,
    Low,
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Similarity::High => "high",
            Similarity::Medium => "medium",
            Similarity::Low => "low",
        };
        write!(f, "{}", s)
    }
}

/// The closed pipeline-stage enumeration for client records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Lead,
    Contacted,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl PipelineStage {
    /// Terminal stages: moving a client here is a business-critical change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::ClosedWon | PipelineStage::ClosedLost)
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lead" => Ok(PipelineStage::Lead),
            "contacted" => Ok(PipelineStage::Contacted),
            "proposal" => Ok(PipelineStage::Proposal),
            "negotiation" => Ok(PipelineStage::Negotiation),
            "closed_won" => Ok(PipelineStage::ClosedWon),
            "closed_lost" => Ok(PipelineStage::ClosedLost),
            _ => Err(format!("Unknown pipeline stage: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// One atomic operation within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Target entity collection (or the mail pseudo-table for send_email).
    pub table: String,
    /// Equality-conjunction match predicate for update/delete/select.
    #[serde(rename = "where", default)]
    pub where_: JsonMap,
    /// Fields to write (or the email envelope for send_email).
    #[serde(default)]
    pub values: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Name under which this step's output becomes available to later steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_key: Option<String>,
}

/// An existing record that may duplicate a proposed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub record_id: String,
    pub name: String,
    pub similarity: Similarity,
}

/// An immutable proposal for a sequence of data mutations.
///
/// `risk_flags`, `needs_confirmation`, `confirmation_message`, and
/// `missing_fields` are derived properties: only the risk evaluator writes
/// them (via `apply_assessment`), and they are recomputed whenever entities
/// or duplicate candidates change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlan {
    pub plan_id: Uuid,
    pub intent: Intent,
    /// Interpreter confidence in [0.0, 1.0].
    pub confidence: f32,
    #[serde(default)]
    pub entities: JsonMap,
    pub steps: Vec<ActionStep>,
    #[serde(default)]
    pub needs_confirmation: bool,
    #[serde(default)]
    pub confirmation_message: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<RiskFlag>,
    #[serde(default)]
    pub duplicate_candidates: Vec<DuplicateCandidate>,
    pub created_at: Timestamp,
}

impl ActionPlan {
    /// Create an unassessed plan as received from the upstream producer.
    pub fn new(
        plan_id: Uuid,
        intent: Intent,
        confidence: f32,
        entities: JsonMap,
        steps: Vec<ActionStep>,
    ) -> Self {
        Self {
            plan_id,
            intent,
            confidence,
            entities,
            steps,
            needs_confirmation: false,
            confirmation_message: String::new(),
            missing_fields: Vec::new(),
            risk_flags: Vec::new(),
            duplicate_candidates: Vec::new(),
            created_at: Timestamp::now(),
        }
    }
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub step_type: StepType,
    pub table: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn success(index: usize, step: &ActionStep, data: serde_json::Value) -> Self {
        Self {
            index,
            step_type: step.step_type,
            table: step.table.clone(),
            status: StepStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(index: usize, step: &ActionStep, message: String) -> Self {
        Self {
            index,
            step_type: step.step_type,
            table: step.table.clone(),
            status: StepStatus::Error,
            data: None,
            error: Some(message),
        }
    }

    pub fn skipped(index: usize, step: &ActionStep) -> Self {
        Self {
            index,
            step_type: step.step_type,
            table: step.table.clone(),
            status: StepStatus::Skipped,
            data: None,
            error: None,
        }
    }
}

/// Outcome of a whole plan run, always structured and explainable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPlanResult {
    pub status: PlanRunStatus,
    pub message: String,
    pub rolled_back: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
}

/// A human edit to one step's values or predicate, made in the confirmation
/// UI before execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepModification {
    pub step_index: usize,
    #[serde(default)]
    pub values: JsonMap,
    #[serde(rename = "where", default)]
    pub where_: JsonMap,
}

/// The caller-facing execution request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub plan_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub modifications: Vec<StepModification>,
}

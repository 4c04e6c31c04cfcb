//! Risk evaluation and the confirmation gate.
//!
//! Every plan passes through `evaluate` before it is surfaced. The evaluator
//! is pure: it inspects intent, entities, steps, and the already-computed
//! duplicate candidates, and produces the derived review properties. Rules
//! run in a fixed order so flags come out deterministically.

use std::str::FromStr;

use serde_json::Value as Json;

use dealflow_core::types::{parse_datetime, JsonMap};

use crate::types::{
    ActionPlan, ActionStep, DuplicateCandidate, Intent, PipelineStage, RiskFlag, Similarity,
    StepType,
};

/// Fields whose change on an existing record is business-critical.
const CRITICAL_FIELDS: [&str; 2] = ["contract_status", "contract_value"];

/// The derived review properties of a plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiskAssessment {
    pub risk_flags: Vec<RiskFlag>,
    pub missing_fields: Vec<String>,
    pub needs_confirmation: bool,
    pub confirmation_message: String,
}

/// Evaluate a plan's risk. Flags are emitted in rule order, each at most once.
pub fn evaluate(
    intent: Intent,
    entities: &JsonMap,
    steps: &[ActionStep],
    duplicates: &[DuplicateCandidate],
) -> RiskAssessment {
    let mut flags = Vec::new();

    // Rule 1: a proposed client name collides with an existing record.
    if matches!(intent, Intent::CreateClient | Intent::UpdateClient) && !duplicates.is_empty() {
        flags.push(RiskFlag::DuplicateClient);
    }

    // Rule 2: a stage value outside the closed pipeline enumeration.
    if has_unknown_stage(entities, steps) {
        flags.push(RiskFlag::UnknownStage);
    }

    // Rule 3: scheduling intents without a parseable date.
    if let Some(field) = date_field(intent) {
        let parseable = entities
            .get(field)
            .and_then(Json::as_str)
            .and_then(parse_datetime)
            .is_some();
        if !parseable {
            flags.push(RiskFlag::MissingDate);
        }
    }

    // Rule 4: any step that leaves the system boundary via email.
    if steps.iter().any(|s| s.step_type == StepType::SendEmail) {
        flags.push(RiskFlag::SendEmailRisk);
    }

    // Rule 5: destructive intents.
    if matches!(intent, Intent::DeleteClient | Intent::DeleteSchedule) {
        flags.push(RiskFlag::DeleteRisk);
    }

    // Rule 6: updates that touch contract fields or close out a client.
    if steps.iter().any(is_high_value_update) {
        flags.push(RiskFlag::HighValueChange);
    }

    let missing_fields = missing_required_fields(intent, entities);

    let needs_confirmation =
        intent.always_confirm() || !flags.is_empty() || !missing_fields.is_empty();
    let confirmation_message = if needs_confirmation {
        confirmation_message(intent, entities, duplicates, &missing_fields)
    } else {
        String::new()
    };

    RiskAssessment {
        risk_flags: flags,
        missing_fields,
        needs_confirmation,
        confirmation_message,
    }
}

impl ActionPlan {
    /// Write the evaluator's output onto the plan's derived fields.
    pub fn apply_assessment(
        &mut self,
        assessment: RiskAssessment,
        duplicates: Vec<DuplicateCandidate>,
    ) {
        self.risk_flags = assessment.risk_flags;
        self.missing_fields = assessment.missing_fields;
        self.needs_confirmation = assessment.needs_confirmation;
        self.confirmation_message = assessment.confirmation_message;
        self.duplicate_candidates = duplicates;
    }
}

fn has_unknown_stage(entities: &JsonMap, steps: &[ActionStep]) -> bool {
    let entity_stage = entities.get("stage").and_then(Json::as_str);
    let step_stages = steps
        .iter()
        .filter_map(|s| s.values.get("stage").and_then(Json::as_str));
    entity_stage
        .into_iter()
        .chain(step_stages)
        .any(|stage| PipelineStage::from_str(stage).is_err())
}

fn date_field(intent: Intent) -> Option<&'static str> {
    match intent {
        Intent::CreateSchedule | Intent::UpdateSchedule => Some("scheduled_at"),
        Intent::CreateReminder => Some("remind_at"),
        _ => None,
    }
}

fn is_high_value_update(step: &ActionStep) -> bool {
    if step.step_type != StepType::Update {
        return false;
    }
    if CRITICAL_FIELDS.iter().any(|f| step.values.contains_key(*f)) {
        return true;
    }
    step.values
        .get("stage")
        .and_then(Json::as_str)
        .and_then(|s| PipelineStage::from_str(s).ok())
        .is_some_and(|stage| stage.is_terminal())
}

/// Fields the intent cannot proceed without. A field counts as present when
/// the entity value is a non-empty string or any non-null non-string.
fn missing_required_fields(intent: Intent, entities: &JsonMap) -> Vec<String> {
    let required: &[&str] = match intent {
        Intent::CreateClient => &["client_name"],
        Intent::UpdateClient | Intent::DeleteClient => &["client_name"],
        Intent::AddContact => &["client_name", "contact_name"],
        Intent::LogActivity => &["client_name", "summary"],
        Intent::MoveStage => &["client_name", "stage"],
        Intent::CreateSchedule => &["title", "scheduled_at"],
        Intent::UpdateSchedule | Intent::DeleteSchedule => &["title"],
        Intent::CreateReminder => &["title", "remind_at"],
        Intent::DraftEmail => &["to", "subject"],
        Intent::SendEmail => &["to", "subject"],
        Intent::CreateProposal => &["client_name", "title"],
        Intent::AttachDocument => &["client_name", "file_name"],
    };
    required
        .iter()
        .filter(|field| {
            match entities.get(**field) {
                Some(Json::String(s)) => s.trim().is_empty(),
                Some(Json::Null) | None => true,
                Some(_) => false,
            }
        })
        .map(|field| field.to_string())
        .collect()
}

fn entity_str<'a>(entities: &'a JsonMap, key: &str, fallback: &'a str) -> &'a str {
    entities.get(key).and_then(Json::as_str).unwrap_or(fallback)
}

fn confirmation_message(
    intent: Intent,
    entities: &JsonMap,
    duplicates: &[DuplicateCandidate],
    missing_fields: &[String],
) -> String {
    let mut parts = Vec::new();

    let base = match intent {
        Intent::DeleteClient => format!(
            "Delete client \"{}\" and its related records? This cannot be undone.",
            entity_str(entities, "client_name", "this client")
        ),
        Intent::DeleteSchedule => format!(
            "Delete schedule \"{}\"? This cannot be undone.",
            entity_str(entities, "title", "this schedule")
        ),
        Intent::SendEmail => format!(
            "Send email to {} with subject \"{}\"?",
            entity_str(entities, "to", "the listed recipient"),
            entity_str(entities, "subject", "")
        ),
        other => format!("Proceed with {}?", other),
    };
    parts.push(base);

    if let Some(best) = duplicates
        .iter()
        .find(|c| c.similarity == Similarity::High)
        .or_else(|| duplicates.first())
    {
        parts.push(format!(
            "A similar client \"{}\" already exists.",
            best.name
        ));
    }

    if !missing_fields.is_empty() {
        parts.push(format!("Missing: {}.", missing_fields.join(", ")));
    }

    parts.join(" ")
}

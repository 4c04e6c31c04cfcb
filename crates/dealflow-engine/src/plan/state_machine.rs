//! Plan status transitions.
//!
//! `pending -> executed` is legal because plans that need no confirmation
//! run without an approval step. There is no way back out of `rejected`,
//! `executed`, or `failed` except the executor's own `executed -> failed`
//! downgrade after a halted run.

use crate::error::PlanError;
use crate::types::PlanStatus;

/// Validate a status transition, returning an error describing the invalid
/// move otherwise.
pub fn validate_transition(from: PlanStatus, to: PlanStatus) -> Result<(), PlanError> {
    use PlanStatus::*;
    let valid = matches!(
        (from, to),
        (Pending, Approved) | (Pending, Rejected) | (Pending, Executed) | (Approved, Executed)
            | (Executed, Failed)
    );
    if valid {
        Ok(())
    } else {
        Err(PlanError::InvalidTransition(from, to))
    }
}

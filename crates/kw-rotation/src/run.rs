//! Per-invocation run state

use chrono::{DateTime, Utc};
use kw_identity::{CallerIdentity, CredentialMetadata};
use std::fmt;
use tracing::debug;

use crate::error::RotationError;
use crate::guardrail::GuardrailVerdict;
use crate::state::RotationState;

/// Time-derived run identifier, e.g. `20240301T120000.123456Z`.
///
/// Sorts chronologically as a string. Evidence keys combine it with the
/// principal, so runs for different principals started in the same
/// microsecond still land in different locations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn from_time(ts: DateTime<Utc>) -> Self {
        Self(ts.format("%Y%m%dT%H%M%S%.6fZ").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mutable state of a single rotation run, owned by the orchestrator
#[derive(Debug)]
pub struct RotationRun {
    run_id: RunId,
    state: RotationState,
    transitions: Vec<RotationState>,
    pub caller: Option<CallerIdentity>,
    pub verdict: Option<GuardrailVerdict>,
    pub old_credential: Option<CredentialMetadata>,
    pub new_credential_id: Option<String>,
    pub errors: Vec<RotationError>,
}

impl RotationRun {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            state: RotationState::Start,
            transitions: vec![RotationState::Start],
            caller: None,
            verdict: None,
            old_credential: None,
            new_credential_id: None,
            errors: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    /// Every state visited so far, starting with `START`
    pub fn transitions(&self) -> &[RotationState] {
        &self.transitions
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: RotationState) -> Result<(), RotationError> {
        if !self.state.can_transition_to(&next) {
            return Err(RotationError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(run_id = %self.run_id, from = %self.state, to = %next, "Rotation state transition");
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }

    pub fn push_error(&mut self, error: RotationError) {
        self.errors.push(error);
    }

    pub fn old_credential_id(&self) -> Option<&str> {
        self.old_credential.as_ref().map(|c| c.id.as_str())
    }
}

//! Rotation state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one rotation run.
///
/// ```text
/// START → IDENTITY_VERIFIED → PRECHECKED → KEY_CREATED → SECRET_PUBLISHED → RETIRE_HANDLED → DONE
///   │             │               ├→ ABORTED_GUARDRAIL       └→ PUBLISH_FAILED → ROLLED_BACK
///   │             │               ├→ ABORTED_SECRET_UNREACHABLE                └→ ROLLBACK_FAILED
///   │             │               ├→ DRY_RUN_DONE
///   │             │               └→ CREATION_FAILED
///   │             └→ PRECHECK_FAILED
///   └→ IDENTITY_FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationState {
    Start,
    IdentityVerified,
    Prechecked,
    AbortedGuardrail,
    AbortedSecretUnreachable,
    DryRunDone,
    KeyCreated,
    SecretPublished,
    RetireHandled,
    Done,
    PublishFailed,
    RolledBack,
    RollbackFailed,
    IdentityFailed,
    PrecheckFailed,
    CreationFailed,
}

impl RotationState {
    pub fn can_transition_to(&self, next: &RotationState) -> bool {
        use RotationState::*;
        matches!(
            (self, next),
            (Start, IdentityVerified)
                | (Start, IdentityFailed)
                | (IdentityVerified, Prechecked)
                | (IdentityVerified, PrecheckFailed)
                | (Prechecked, AbortedGuardrail)
                | (Prechecked, AbortedSecretUnreachable)
                | (Prechecked, DryRunDone)
                | (Prechecked, KeyCreated)
                | (Prechecked, CreationFailed)
                | (KeyCreated, SecretPublished)
                | (KeyCreated, PublishFailed)
                | (PublishFailed, RolledBack)
                | (PublishFailed, RollbackFailed)
                | (SecretPublished, RetireHandled)
                | (RetireHandled, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_status().is_some()
    }

    /// Run status reported for a terminal state
    pub fn terminal_status(&self) -> Option<RunStatus> {
        use RotationState::*;
        match self {
            Done => Some(RunStatus::Ok),
            DryRunDone => Some(RunStatus::DryRunDone),
            AbortedGuardrail => Some(RunStatus::AbortedGuardrail),
            AbortedSecretUnreachable => Some(RunStatus::AbortedSecretUnreachable),
            IdentityFailed => Some(RunStatus::IdentityVerificationFailed),
            PrecheckFailed => Some(RunStatus::PrecheckFailed),
            CreationFailed => Some(RunStatus::CreationFailed),
            RolledBack | RollbackFailed => Some(RunStatus::PublishFailed),
            Start | IdentityVerified | Prechecked | KeyCreated | SecretPublished | RetireHandled
            | PublishFailed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use RotationState::*;
        match self {
            Start => "START",
            IdentityVerified => "IDENTITY_VERIFIED",
            Prechecked => "PRECHECKED",
            AbortedGuardrail => "ABORTED_GUARDRAIL",
            AbortedSecretUnreachable => "ABORTED_SECRET_UNREACHABLE",
            DryRunDone => "DRY_RUN_DONE",
            KeyCreated => "KEY_CREATED",
            SecretPublished => "SECRET_PUBLISHED",
            RetireHandled => "RETIRE_HANDLED",
            Done => "DONE",
            PublishFailed => "PUBLISH_FAILED",
            RolledBack => "ROLLED_BACK",
            RollbackFailed => "ROLLBACK_FAILED",
            IdentityFailed => "IDENTITY_FAILED",
            PrecheckFailed => "PRECHECK_FAILED",
            CreationFailed => "CREATION_FAILED",
        }
    }
}

impl fmt::Display for RotationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall outcome of a run, as written to `result.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Ok,
    DryRunDone,
    AbortedGuardrail,
    AbortedSecretUnreachable,
    IdentityVerificationFailed,
    PrecheckFailed,
    CreationFailed,
    PublishFailed,
    /// The state machine was driven out of order; indicates a bug
    InternalError,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Ok | RunStatus::DryRunDone => 0,
            RunStatus::IdentityVerificationFailed
            | RunStatus::PrecheckFailed
            | RunStatus::InternalError => 1,
            RunStatus::AbortedGuardrail => 3,
            RunStatus::AbortedSecretUnreachable => 4,
            RunStatus::CreationFailed => 5,
            RunStatus::PublishFailed => 6,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Ok | RunStatus::DryRunDone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "OK",
            RunStatus::DryRunDone => "DRY_RUN_DONE",
            RunStatus::AbortedGuardrail => "ABORTED_GUARDRAIL",
            RunStatus::AbortedSecretUnreachable => "ABORTED_SECRET_UNREACHABLE",
            RunStatus::IdentityVerificationFailed => "IDENTITY_VERIFICATION_FAILED",
            RunStatus::PrecheckFailed => "PRECHECK_FAILED",
            RunStatus::CreationFailed => "CREATION_FAILED",
            RunStatus::PublishFailed => "PUBLISH_FAILED",
            RunStatus::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RotationState; 16] = [
        RotationState::Start,
        RotationState::IdentityVerified,
        RotationState::Prechecked,
        RotationState::AbortedGuardrail,
        RotationState::AbortedSecretUnreachable,
        RotationState::DryRunDone,
        RotationState::KeyCreated,
        RotationState::SecretPublished,
        RotationState::RetireHandled,
        RotationState::Done,
        RotationState::PublishFailed,
        RotationState::RolledBack,
        RotationState::RollbackFailed,
        RotationState::IdentityFailed,
        RotationState::PrecheckFailed,
        RotationState::CreationFailed,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL.iter() {
                assert!(!from.can_transition_to(to), "{} -> {} should be rejected", from, to);
            }
        }
    }

    #[test]
    fn test_mutation_only_after_precheck() {
        for from in ALL.iter() {
            if from.can_transition_to(&RotationState::KeyCreated) {
                assert_eq!(*from, RotationState::Prechecked);
            }
        }
    }

    #[test]
    fn test_rollback_only_from_publish_failed() {
        for from in ALL.iter() {
            if from.can_transition_to(&RotationState::RolledBack)
                || from.can_transition_to(&RotationState::RollbackFailed)
            {
                assert_eq!(*from, RotationState::PublishFailed);
            }
        }
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        assert_eq!(serde_json::to_string(&RunStatus::Ok).unwrap(), "\"OK\"");
        assert_eq!(
            serde_json::to_string(&RunStatus::AbortedSecretUnreachable).unwrap(),
            "\"ABORTED_SECRET_UNREACHABLE\""
        );
        assert_eq!(
            serde_json::to_string(&RotationState::RolledBack).unwrap(),
            "\"ROLLED_BACK\""
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Ok.exit_code(), 0);
        assert_eq!(RunStatus::DryRunDone.exit_code(), 0);
        assert_eq!(RunStatus::IdentityVerificationFailed.exit_code(), 1);
        assert_eq!(RunStatus::AbortedGuardrail.exit_code(), 3);
        assert_eq!(RunStatus::AbortedSecretUnreachable.exit_code(), 4);
        assert_eq!(RunStatus::CreationFailed.exit_code(), 5);
        assert_eq!(RunStatus::PublishFailed.exit_code(), 6);
    }

    #[test]
    fn test_both_rollback_outcomes_report_publish_failed() {
        assert_eq!(RotationState::RolledBack.terminal_status(), Some(RunStatus::PublishFailed));
        assert_eq!(RotationState::RollbackFailed.terminal_status(), Some(RunStatus::PublishFailed));
        assert_eq!(RotationState::PublishFailed.terminal_status(), None);
    }
}

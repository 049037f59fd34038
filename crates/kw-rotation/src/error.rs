//! Rotation error taxonomy

use thiserror::Error;

use crate::state::RotationState;

/// Errors raised while validating or executing a rotation.
///
/// Messages carry collaborator error text only; none of them is ever built
/// from secret material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// Bad input, rejected before any remote call
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Identity verification failed: {0}")]
    IdentityVerificationFailed(String),

    /// Remote failure not otherwise classified
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Guardrail abort: principal has {existing} keys, maximum allowed is {ceiling}")]
    GuardrailAbort { existing: usize, ceiling: usize },

    #[error("Secret container unreachable: {0}")]
    SecretContainerUnreachable(String),

    #[error("Credential creation failed: {0}")]
    CreationFailed(String),

    /// Triggers the rollback of the created credential
    #[error("Secret publication failed: {0}")]
    PublishFailed(String),

    /// Recorded only; the run still reports the publish failure
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    /// Recorded only; the run still completes
    #[error("Retirement of old credential failed: {0}")]
    RetirementFailed(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: RotationState, to: RotationState },
}

impl RotationError {
    /// Short machine-readable kind used in evidence error entries
    pub fn kind(&self) -> &'static str {
        match self {
            RotationError::Usage(_) => "UsageError",
            RotationError::IdentityVerificationFailed(_) => "IdentityVerificationFailed",
            RotationError::Transport(_) => "TransportError",
            RotationError::GuardrailAbort { .. } => "GuardrailAbort",
            RotationError::SecretContainerUnreachable(_) => "SecretContainerUnreachable",
            RotationError::CreationFailed(_) => "CreationFailed",
            RotationError::PublishFailed(_) => "PublishFailed",
            RotationError::RollbackFailed(_) => "RollbackFailed",
            RotationError::RetirementFailed(_) => "RetirementFailed",
            RotationError::InvalidTransition { .. } => "InvalidTransition",
        }
    }

    /// Process exit code when this error ends a run
    pub fn exit_code(&self) -> i32 {
        match self {
            RotationError::Usage(_) => 2,
            RotationError::GuardrailAbort { .. } => 3,
            RotationError::SecretContainerUnreachable(_) => 4,
            RotationError::CreationFailed(_) => 5,
            RotationError::PublishFailed(_) | RotationError::RollbackFailed(_) => 6,
            RotationError::RetirementFailed(_) => 0,
            RotationError::IdentityVerificationFailed(_)
            | RotationError::Transport(_)
            | RotationError::InvalidTransition { .. } => 1,
        }
    }
}

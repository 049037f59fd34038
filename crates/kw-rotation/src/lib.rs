//! Keyward Rotation
//!
//! Guarded rotation of a principal's access keys:
//!
//! 1. verify the caller against the identity system
//! 2. list existing keys, pick the oldest, apply the key-count guardrail
//! 3. check the target secret container exists
//! 4. create a new key and publish it as the container's current version
//! 5. optionally deactivate or delete the old key
//!
//! Every run produces exactly one [`EvidenceRecord`], whatever the outcome.
//! If publishing fails after the key was created, the new key is deleted
//! again and the outcome of that rollback is part of the evidence.

pub mod error;
pub mod evidence;
pub mod guardrail;
pub mod orchestrator;
pub mod request;
pub mod rollback;
pub mod run;
pub mod sink;
pub mod state;
pub mod summary;

mod payload;

pub use error::RotationError;
pub use evidence::{
    ActionEntry, ErrorEntry, EvidenceInputs, EvidenceRecord, EvidenceRecorder, Precheck,
    RotationPlan, RunResult, StepOutcome,
};
pub use guardrail::{GuardrailPolicy, GuardrailVerdict};
pub use orchestrator::{RotationOrchestrator, RotationOutcome};
pub use request::{RetireMode, RotationRequest, RotationRequestBuilder, CONFIRM_DELETE_TOKEN};
pub use rollback::{RollbackAction, RollbackOutcome};
pub use run::{RotationRun, RunId};
pub use sink::{evidence_key, EvidenceError, EvidenceSink, FileEvidenceSink, MemoryEvidenceSink};
pub use state::{RotationState, RunStatus};
pub use summary::RunSummary;

//! Sanitized console summary of a run

use serde::Serialize;

use crate::orchestrator::RotationOutcome;
use crate::state::RunStatus;

const STORED_NOTE: &str = "Secret access key stored in the secret container; never printed.";

/// One-line JSON summary printed to stdout. Never contains secret material.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub ok: bool,
    pub status: RunStatus,
    pub run_id: String,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_access_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_ok: Option<bool>,
    pub error_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl From<&RotationOutcome> for RunSummary {
    fn from(outcome: &RotationOutcome) -> Self {
        let record = &outcome.record;
        let rollback_ok = record.actions_for("rollback").first().map(|a| a.ok);

        Self {
            ok: outcome.status.is_success(),
            status: outcome.status,
            run_id: record.run_id.clone(),
            dry_run: record.inputs.dry_run,
            new_access_key_id: record.result.new_access_key_id.clone(),
            old_access_key_id: record.result.old_access_key_id.clone(),
            message: record.result.message.clone(),
            rollback_ok,
            error_count: record.errors.len(),
            evidence: outcome.evidence_location.clone(),
            evidence_error: outcome.evidence_error.clone(),
            note: (outcome.status == RunStatus::Ok).then_some(STORED_NOTE),
        }
    }
}

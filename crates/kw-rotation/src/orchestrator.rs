//! Rotation orchestrator
//!
//! Drives one run through the state machine in [`crate::state`]. Each remote
//! call is awaited in order; a failure is recorded at the step that raised it
//! and moves the run to the matching terminal state. The only error that
//! escapes [`RotationOrchestrator::drive`] is an invalid transition, which is
//! reported as `INTERNAL_ERROR`.

use chrono::{DateTime, Utc};
use kw_common::to_iso;
use kw_identity::{oldest_credential, CredentialStatus, IdentityProvider, NewCredential};
use kw_secrets::SecretStore;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::RotationError;
use crate::evidence::{EvidenceRecord, EvidenceRecorder, RotationPlan, StepOutcome};
use crate::guardrail::GuardrailPolicy;
use crate::payload::build_payload;
use crate::request::{RetireMode, RotationRequest};
use crate::rollback::{RollbackAction, RollbackOutcome};
use crate::run::{RotationRun, RunId};
use crate::sink::EvidenceSink;
use crate::state::{RotationState, RunStatus};
use crate::summary::RunSummary;

/// Result of one rotation run
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub status: RunStatus,
    pub final_state: RotationState,
    pub record: EvidenceRecord,
    pub evidence_location: Option<String>,
    pub evidence_error: Option<String>,
}

impl RotationOutcome {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from(self)
    }
}

/// Runs guarded rotations against an identity provider and a secret store.
///
/// Holds no per-run state; share it through an `Arc` to rotate several
/// principals concurrently.
pub struct RotationOrchestrator {
    identity: Arc<dyn IdentityProvider>,
    secrets: Arc<dyn SecretStore>,
    evidence: Arc<dyn EvidenceSink>,
    guardrail: GuardrailPolicy,
}

impl RotationOrchestrator {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        secrets: Arc<dyn SecretStore>,
        evidence: Arc<dyn EvidenceSink>,
    ) -> Self {
        Self {
            identity,
            secrets,
            evidence,
            guardrail: GuardrailPolicy::new(),
        }
    }

    /// Execute one rotation. Always produces an evidence record, whatever
    /// the outcome.
    pub async fn rotate(&self, request: &RotationRequest) -> RotationOutcome {
        let started_at = Utc::now();
        let run_id = RunId::from_time(started_at);
        let span = info_span!(
            "rotation",
            run_id = %run_id,
            principal = %request.principal()
        );
        self.execute(request, run_id, started_at).instrument(span).await
    }

    async fn execute(
        &self,
        request: &RotationRequest,
        run_id: RunId,
        started_at: DateTime<Utc>,
    ) -> RotationOutcome {
        info!(
            secret_id = %request.secret_id(),
            identity = self.identity.name(),
            secrets = self.secrets.name(),
            dry_run = request.dry_run(),
            retire_mode = %request.retire_mode(),
            "Starting access key rotation"
        );

        let mut run = RotationRun::new(run_id.clone());
        let mut recorder = EvidenceRecorder::begin(request, &run_id, started_at, self.evidence.clone());

        let status = match self.drive(request, &mut run, &mut recorder).await {
            Ok(()) => run.state().terminal_status().unwrap_or(RunStatus::InternalError),
            Err(e) => {
                error!(error = %e, state = %run.state(), "Rotation aborted by state machine");
                recorder.record_error("state_machine", &e);
                recorder.set_message(e.to_string());
                RunStatus::InternalError
            }
        };

        let finished = recorder.finish(&run, status).await;
        let (evidence_location, evidence_error) = match finished.location {
            Ok(location) => (Some(location), None),
            Err(e) => (None, Some(e.to_string())),
        };

        if status.is_success() {
            info!(status = %status, final_state = %run.state(), "Rotation finished");
        } else {
            warn!(status = %status, final_state = %run.state(), "Rotation finished without success");
        }

        RotationOutcome {
            status,
            final_state: run.state(),
            record: finished.record,
            evidence_location,
            evidence_error,
        }
    }

    async fn drive(
        &self,
        request: &RotationRequest,
        run: &mut RotationRun,
        recorder: &mut EvidenceRecorder,
    ) -> Result<(), RotationError> {
        let principal = request.principal();

        // Identity
        let caller = match self.identity.caller_identity().await {
            Ok(caller) => caller,
            Err(e) => {
                let err = RotationError::IdentityVerificationFailed(e.to_string());
                return terminate(run, recorder, "verify_identity", err, RotationState::IdentityFailed);
            }
        };
        info!(account = ?caller.account, arn = ?caller.arn, "Caller identity verified");
        recorder.set_caller_identity(&caller);
        run.caller = Some(caller);
        run.advance(RotationState::IdentityVerified)?;

        // Inventory
        let existing = match self.identity.list_credentials(principal).await {
            Ok(existing) => existing,
            Err(e) => {
                let err = RotationError::Transport(e.to_string());
                return terminate(run, recorder, "list_credentials", err, RotationState::PrecheckFailed);
            }
        };
        let old = oldest_credential(&existing).cloned();
        recorder.set_inventory(&existing, old.as_ref());
        info!(
            existing_keys = existing.len(),
            old_access_key_id = ?old.as_ref().map(|c| c.id.as_str()),
            "Listed existing access keys"
        );
        run.old_credential = old;
        run.advance(RotationState::Prechecked)?;

        // Guardrail, before any describe or mutation
        let ceiling = request.max_existing_keys();
        let verdict = self.guardrail.evaluate(existing.len(), ceiling);
        recorder.set_guardrail(verdict);
        run.verdict = Some(verdict);
        if verdict.is_abort() {
            let err = RotationError::GuardrailAbort {
                existing: existing.len(),
                ceiling,
            };
            return terminate(run, recorder, "guardrail", err, RotationState::AbortedGuardrail);
        }

        // Secret container
        match self.secrets.describe(request.secret_id()).await {
            Ok(metadata) => {
                recorder.set_secret_describe(&metadata);
                if metadata.is_scheduled_for_deletion() {
                    let err = RotationError::SecretContainerUnreachable(format!(
                        "secret {} is scheduled for deletion",
                        request.secret_id()
                    ));
                    return terminate(
                        run,
                        recorder,
                        "describe_secret",
                        err,
                        RotationState::AbortedSecretUnreachable,
                    );
                }
            }
            Err(e) => {
                let err = RotationError::SecretContainerUnreachable(e.to_string());
                return terminate(
                    run,
                    recorder,
                    "describe_secret",
                    err,
                    RotationState::AbortedSecretUnreachable,
                );
            }
        }

        recorder.set_plan(RotationPlan::for_request(request, run.old_credential_id()));
        if request.dry_run() {
            info!("Dry run: no changes made");
            recorder.set_message("Dry run: no changes made");
            return run.advance(RotationState::DryRunDone);
        }

        // Create
        let created = match self.identity.create_credential(principal).await {
            Ok(created) => created,
            Err(e) => {
                let err = RotationError::CreationFailed(e.to_string());
                recorder.record_step("KEY_CREATED", StepOutcome::failure().with("error", err.to_string()));
                return terminate(run, recorder, "create_credential", err, RotationState::CreationFailed);
            }
        };
        recorder.record_step(
            "KEY_CREATED",
            StepOutcome::success()
                .with("new_access_key_id", &created.id)
                .with("status", created.status)
                .with("create_date", to_iso(&created.created_at))
                .with_secret("new_secret_access_key_redacted", &created.secret),
        );
        recorder.set_new_access_key_id(&created.id);
        info!(new_access_key_id = %created.id, "Created new access key");
        run.new_credential_id = Some(created.id.clone());
        run.advance(RotationState::KeyCreated)?;

        // Publish; the raw secret is dropped as soon as this returns
        let new_id = created.id.clone();
        if let Err(err) = self.publish(request, run.old_credential_id(), created, recorder).await {
            return self.compensate(principal, &new_id, err, run, recorder).await;
        }
        run.advance(RotationState::SecretPublished)?;

        // Retire
        if let Some(old) = run.old_credential.clone() {
            self.retire(principal, request.retire_mode(), &old.id, run, recorder).await;
        }
        run.advance(RotationState::RetireHandled)?;

        recorder.set_message("Rotation completed");
        run.advance(RotationState::Done)
    }

    async fn publish(
        &self,
        request: &RotationRequest,
        rotated_from: Option<&str>,
        created: NewCredential,
        recorder: &mut EvidenceRecorder,
    ) -> Result<(), RotationError> {
        let secret_id = request.secret_id();
        let payload = build_payload(
            request.principal(),
            &created.id,
            &created.secret,
            rotated_from,
            Utc::now(),
        )
        .map_err(|e| RotationError::PublishFailed(format!("failed to encode secret payload: {}", e)));
        drop(created);

        let result = match payload {
            Ok(payload) => self
                .secrets
                .put_value(secret_id, &payload)
                .await
                .map_err(|e| RotationError::PublishFailed(e.to_string())),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                info!(
                    secret_id,
                    version_id = ?outcome.version_id,
                    "Published new access key to secret store"
                );
                recorder.record_step(
                    "SECRET_PUBLISHED",
                    StepOutcome::success()
                        .with("secret_id", secret_id)
                        .with("arn", &outcome.arn)
                        .with("version_id", &outcome.version_id)
                        .with("version_stages", &outcome.version_stages),
                );
                Ok(())
            }
            Err(err) => {
                error!(secret_id, error = %err, "Failed to publish new access key");
                recorder.record_step(
                    "PUBLISH_FAILED",
                    StepOutcome::failure()
                        .with("secret_id", secret_id)
                        .with("error", err.to_string()),
                );
                Err(err)
            }
        }
    }

    async fn compensate(
        &self,
        principal: &str,
        created_id: &str,
        cause: RotationError,
        run: &mut RotationRun,
        recorder: &mut EvidenceRecorder,
    ) -> Result<(), RotationError> {
        recorder.record_error("publish_secret", &cause);
        run.push_error(cause);
        run.advance(RotationState::PublishFailed)?;

        match RollbackAction::new(self.identity.as_ref())
            .compensate(principal, created_id)
            .await
        {
            RollbackOutcome::Ok => {
                recorder.record_step(
                    "rollback",
                    StepOutcome::success().with("access_key_id", created_id),
                );
                recorder.set_message("Secret publication failed; new access key rolled back");
                run.advance(RotationState::RolledBack)
            }
            RollbackOutcome::Failed(message) => {
                recorder.record_step(
                    "rollback",
                    StepOutcome::failure()
                        .with("access_key_id", created_id)
                        .with("error", &message),
                );
                let err = RotationError::RollbackFailed(message);
                recorder.record_error("rollback", &err);
                run.push_error(err);
                recorder.set_message(format!(
                    "Secret publication failed; rollback failed, access key {} requires manual cleanup",
                    created_id
                ));
                run.advance(RotationState::RollbackFailed)
            }
        }
    }

    async fn retire(
        &self,
        principal: &str,
        mode: RetireMode,
        old_id: &str,
        run: &mut RotationRun,
        recorder: &mut EvidenceRecorder,
    ) {
        let (step, error_step, result) = match mode {
            RetireMode::None => return,
            RetireMode::Deactivate => (
                "OLD_KEY_DEACTIVATED",
                "deactivate_old",
                self.identity
                    .set_status(principal, old_id, CredentialStatus::Inactive)
                    .await,
            ),
            RetireMode::Delete => (
                "OLD_KEY_DELETED",
                "delete_old",
                self.identity.delete_credential(principal, old_id).await,
            ),
        };

        match result {
            Ok(()) => {
                info!(old_access_key_id = old_id, retire_mode = %mode, "Retired old access key");
                recorder.record_step(step, StepOutcome::success().with("access_key_id", old_id));
            }
            Err(e) => {
                let err = RotationError::RetirementFailed(e.to_string());
                warn!(old_access_key_id = old_id, error = %err, "Old access key was not retired");
                recorder.record_step(
                    step,
                    StepOutcome::failure()
                        .with("access_key_id", old_id)
                        .with("error", err.to_string()),
                );
                recorder.record_error(error_step, &err);
                run.push_error(err);
            }
        }
    }
}

/// Record `err` at `step` and move the run to the `terminal` state
fn terminate(
    run: &mut RotationRun,
    recorder: &mut EvidenceRecorder,
    step: &str,
    err: RotationError,
    terminal: RotationState,
) -> Result<(), RotationError> {
    warn!(step, error = %err, "Rotation step failed");
    recorder.record_error(step, &err);
    recorder.set_message(err.to_string());
    run.push_error(err);
    run.advance(terminal)
}

//! Evidence recording
//!
//! [`EvidenceRecorder`] accumulates the audit trail of one run and persists
//! it exactly once: `finish` consumes the recorder. Secret fields enter the
//! recorder only as `&SecretValue` through [`StepOutcome::with_secret`] and
//! are redacted here, so no caller can place a raw value in the record.

use chrono::{DateTime, Utc};
use kw_common::{to_iso, utc_now_iso, SecretValue};
use kw_identity::{CallerIdentity, CredentialMetadata, CredentialStatus};
use kw_secrets::SecretMetadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::RotationError;
use crate::guardrail::GuardrailVerdict;
use crate::request::{RetireMode, RotationRequest};
use crate::run::{RotationRun, RunId};
use crate::sink::{evidence_key, EvidenceError, EvidenceSink};
use crate::state::{RotationState, RunStatus};

/// Sanitized, durable record of one rotation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub inputs: EvidenceInputs,
    pub caller_identity: Option<CallerIdentity>,
    pub precheck: Precheck,
    pub actions: Vec<ActionEntry>,
    pub result: RunResult,
    pub errors: Vec<ErrorEntry>,
}

impl EvidenceRecord {
    /// Actions recorded for `step`, in order
    pub fn actions_for(&self, step: &str) -> Vec<&ActionEntry> {
        self.actions.iter().filter(|a| a.step == step).collect()
    }
}

/// Echo of the request. Contains no secret material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceInputs {
    pub principal: String,
    pub secret_id: String,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub max_existing_keys: usize,
    pub dry_run: bool,
    pub retire_mode: RetireMode,
    pub delete_confirmed: bool,
}

impl From<&RotationRequest> for EvidenceInputs {
    fn from(request: &RotationRequest) -> Self {
        Self {
            principal: request.principal().to_string(),
            secret_id: request.secret_id().to_string(),
            region: request.region().map(str::to_string),
            endpoint_url: request.endpoint_url().map(str::to_string),
            max_existing_keys: request.max_existing_keys(),
            dry_run: request.dry_run(),
            retire_mode: request.retire_mode(),
            delete_confirmed: request.retire_mode() == RetireMode::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingKey {
    pub access_key_id: String,
    pub status: CredentialStatus,
    pub create_date: String,
}

impl From<&CredentialMetadata> for ExistingKey {
    fn from(credential: &CredentialMetadata) -> Self {
        Self {
            access_key_id: credential.id.clone(),
            status: credential.status,
            create_date: to_iso(&credential.created_at),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Precheck {
    pub existing_keys_count: Option<usize>,
    pub existing_keys: Vec<ExistingKey>,
    pub old_key_access_key_id: Option<String>,
    pub guardrail: Option<GuardrailVerdict>,
    pub secret_describe: Option<SecretMetadata>,
    pub plan: Option<RotationPlan>,
}

/// What a non-dry-run invocation does with the current inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPlan {
    pub principal: String,
    pub secret_id: String,
    pub will_create_new_key: bool,
    pub will_put_secret_value: bool,
    pub old_key_access_key_id: Option<String>,
    pub will_deactivate_old: bool,
    pub will_delete_old: bool,
}

impl RotationPlan {
    pub fn for_request(request: &RotationRequest, old_key_id: Option<&str>) -> Self {
        let has_old = old_key_id.is_some();
        Self {
            principal: request.principal().to_string(),
            secret_id: request.secret_id().to_string(),
            will_create_new_key: true,
            will_put_secret_value: true,
            old_key_access_key_id: old_key_id.map(str::to_string),
            will_deactivate_old: has_old && request.retire_mode() == RetireMode::Deactivate,
            will_delete_old: has_old && request.retire_mode() == RetireMode::Delete,
        }
    }
}

/// One attempted mutating step (or its compensation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub step: String,
    pub ok: bool,
    pub at: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ActionEntry {
    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub step: String,
    pub kind: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: Option<RunStatus>,
    pub final_state: Option<RotationState>,
    pub message: Option<String>,
    pub new_access_key_id: Option<String>,
    pub old_access_key_id: Option<String>,
    pub transitions: Vec<RotationState>,
}

enum Field<'a> {
    Plain(Value),
    Secret(&'a SecretValue),
}

/// Outcome of a step, handed to [`EvidenceRecorder::record_step`]
pub struct StepOutcome<'a> {
    ok: bool,
    fields: Vec<(String, Field<'a>)>,
}

impl<'a> StepOutcome<'a> {
    pub fn success() -> Self {
        Self {
            ok: true,
            fields: Vec::new(),
        }
    }

    pub fn failure() -> Self {
        Self {
            ok: false,
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            warn!(field = key, error = %e, "Evidence field not serializable, recorded as null");
            Value::Null
        });
        self.fields.push((key.to_string(), Field::Plain(value)));
        self
    }

    /// Attach a secret; only its redacted tail is recorded
    pub fn with_secret(mut self, key: &str, secret: &'a SecretValue) -> Self {
        self.fields.push((key.to_string(), Field::Secret(secret)));
        self
    }
}

/// Attempts at a free key before a taken evidence key is reported as an error
const MAX_KEY_ATTEMPTS: usize = 16;

/// Evidence persisted at the end of a run
pub struct FinishedEvidence {
    pub record: EvidenceRecord,
    pub location: Result<String, EvidenceError>,
}

/// Append-only recorder for one run
pub struct EvidenceRecorder {
    record: EvidenceRecord,
    key: String,
    sink: Arc<dyn EvidenceSink>,
}

impl EvidenceRecorder {
    pub fn begin(
        request: &RotationRequest,
        run_id: &RunId,
        started_at: DateTime<Utc>,
        sink: Arc<dyn EvidenceSink>,
    ) -> Self {
        Self {
            record: EvidenceRecord {
                run_id: run_id.to_string(),
                started_at: to_iso(&started_at),
                finished_at: None,
                inputs: EvidenceInputs::from(request),
                caller_identity: None,
                precheck: Precheck::default(),
                actions: Vec::new(),
                result: RunResult::default(),
                errors: Vec::new(),
            },
            key: evidence_key(run_id.as_str(), request.principal()),
            sink,
        }
    }

    /// Storage key this run's evidence is written under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state of the record
    pub fn snapshot(&self) -> &EvidenceRecord {
        &self.record
    }

    pub fn record_step(&mut self, step: &str, outcome: StepOutcome<'_>) {
        let mut details = Map::new();
        for (key, field) in outcome.fields {
            let value = match field {
                Field::Plain(value) => value,
                Field::Secret(secret) => Value::String(secret.redacted()),
            };
            details.insert(key, value);
        }
        self.record.actions.push(ActionEntry {
            step: step.to_string(),
            ok: outcome.ok,
            at: utc_now_iso(),
            details,
        });
    }

    pub fn record_error(&mut self, step: &str, error: &RotationError) {
        self.record.errors.push(ErrorEntry {
            step: step.to_string(),
            kind: error.kind().to_string(),
            error: error.to_string(),
        });
    }

    pub fn set_caller_identity(&mut self, caller: &CallerIdentity) {
        self.record.caller_identity = Some(caller.clone());
    }

    pub fn set_inventory(&mut self, existing: &[CredentialMetadata], old: Option<&CredentialMetadata>) {
        self.record.precheck.existing_keys_count = Some(existing.len());
        self.record.precheck.existing_keys = existing.iter().map(ExistingKey::from).collect();
        self.record.precheck.old_key_access_key_id = old.map(|c| c.id.clone());
        self.record.result.old_access_key_id = old.map(|c| c.id.clone());
    }

    pub fn set_guardrail(&mut self, verdict: GuardrailVerdict) {
        self.record.precheck.guardrail = Some(verdict);
    }

    pub fn set_secret_describe(&mut self, metadata: &SecretMetadata) {
        self.record.precheck.secret_describe = Some(metadata.clone());
    }

    pub fn set_plan(&mut self, plan: RotationPlan) {
        self.record.precheck.plan = Some(plan);
    }

    pub fn set_new_access_key_id(&mut self, id: &str) {
        self.record.result.new_access_key_id = Some(id.to_string());
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.record.result.message = Some(message.into());
    }

    /// Close the record and write it to the sink.
    ///
    /// A key already taken by another run (same run id and principal) is
    /// retried as `<key>_2`, `<key>_3`, ... so the record is never dropped.
    pub async fn finish(mut self, run: &RotationRun, status: RunStatus) -> FinishedEvidence {
        self.record.result.status = Some(status);
        self.record.result.final_state = Some(run.state());
        self.record.result.transitions = run.transitions().to_vec();
        self.record.finished_at = Some(utc_now_iso());

        let mut key = self.key.clone();
        let mut attempt = 1;
        let location = loop {
            match self.sink.write(&key, &self.record).await {
                Err(EvidenceError::AlreadyExists(existing)) if attempt < MAX_KEY_ATTEMPTS => {
                    attempt += 1;
                    warn!(existing = %existing, attempt, "Evidence key taken, writing under a suffixed key");
                    key = format!("{}_{}", self.key, attempt);
                }
                other => break other,
            }
        };
        match &location {
            Ok(location) => info!(evidence = %location, sink = self.sink.name(), "Evidence recorded"),
            Err(e) => error!(error = %e, key = %key, "Failed to write evidence"),
        }

        FinishedEvidence {
            record: self.record,
            location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryEvidenceSink;

    fn request() -> RotationRequest {
        RotationRequest::builder("alice", "lab/iam/alice").build().unwrap()
    }

    #[test]
    fn test_secret_fields_are_redacted() {
        let sink = Arc::new(MemoryEvidenceSink::new());
        let run_id = RunId::from_time(Utc::now());
        let mut recorder = EvidenceRecorder::begin(&request(), &run_id, Utc::now(), sink);

        let secret = SecretValue::new("wJalrXUtnFEMIK7MDENGbPxRfiCYzzzz9XyZ");
        recorder.record_step(
            "KEY_CREATED",
            StepOutcome::success()
                .with("new_access_key_id", "AKIANEW")
                .with_secret("new_secret_access_key_redacted", &secret),
        );

        let json = serde_json::to_string(recorder.snapshot()).unwrap();
        assert!(!json.contains(secret.expose_secret()));
        let action = &recorder.snapshot().actions[0];
        assert_eq!(
            action.detail("new_secret_access_key_redacted").and_then(Value::as_str),
            Some("********************************9XyZ")
        );
        assert_eq!(action.detail("new_access_key_id").and_then(Value::as_str), Some("AKIANEW"));
    }

    #[test]
    fn test_action_entry_flattens_details() {
        let mut details = Map::new();
        details.insert("access_key_id".to_string(), Value::String("AKIANEW".to_string()));
        let entry = ActionEntry {
            step: "rollback".to_string(),
            ok: true,
            at: "2024-03-01T00:00:00.000000Z".to_string(),
            details,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["step"], "rollback");
        assert_eq!(value["ok"], true);
        assert_eq!(value["access_key_id"], "AKIANEW");
    }

    #[test]
    fn test_plan_retire_flags_need_old_key() {
        let request = RotationRequest::builder("alice", "lab/x")
            .retire_mode(RetireMode::Deactivate)
            .build()
            .unwrap();

        let without_old = RotationPlan::for_request(&request, None);
        assert!(!without_old.will_deactivate_old);

        let with_old = RotationPlan::for_request(&request, Some("AKIAOLD"));
        assert!(with_old.will_deactivate_old);
        assert!(!with_old.will_delete_old);
    }

    #[tokio::test]
    async fn test_finish_writes_once() {
        let sink = Arc::new(MemoryEvidenceSink::new());
        let run_id = RunId::from_time(Utc::now());
        let recorder = EvidenceRecorder::begin(&request(), &run_id, Utc::now(), sink.clone());
        let run = RotationRun::new(run_id);

        let finished = recorder.finish(&run, RunStatus::InternalError).await;

        assert!(finished.location.is_ok());
        assert_eq!(sink.len(), 1);
        assert!(finished.record.finished_at.is_some());
        assert_eq!(finished.record.result.status, Some(RunStatus::InternalError));
    }

    #[test]
    fn test_unserializable_field_recorded_as_null() {
        let sink = Arc::new(MemoryEvidenceSink::new());
        let run_id = RunId::from_time(Utc::now());
        let mut recorder = EvidenceRecorder::begin(&request(), &run_id, Utc::now(), sink);

        // JSON object keys must be strings
        let mut bad = std::collections::HashMap::new();
        bad.insert((1u8, 2u8), "value");
        recorder.record_step("KEY_CREATED", StepOutcome::success().with("bad", bad).with("ok_field", 1));

        let action = &recorder.snapshot().actions[0];
        assert_eq!(action.detail("bad"), Some(&Value::Null));
        assert_eq!(action.detail("ok_field"), Some(&Value::from(1)));
    }

    #[tokio::test]
    async fn test_same_run_id_and_principal_keeps_both_records() {
        let sink = Arc::new(MemoryEvidenceSink::new());
        let run_id = RunId::from_time(Utc::now());

        let mut locations = Vec::new();
        for _ in 0..2 {
            let recorder = EvidenceRecorder::begin(&request(), &run_id, Utc::now(), sink.clone());
            let run = RotationRun::new(run_id.clone());
            locations.push(recorder.finish(&run, RunStatus::InternalError).await.location.unwrap());
        }

        let base = evidence_key(run_id.as_str(), "alice");
        let keys: Vec<String> = sink.records().into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![base.clone(), format!("{}_2", base)]);
        assert_ne!(locations[0], locations[1]);
    }
}

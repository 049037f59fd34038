//! In-memory secret store with call recording and failure injection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kw_common::SecretValue;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::{PutSecretOutcome, SecretMetadata, SecretStore, SecretsError};

const CURRENT_STAGE: &str = "AWSCURRENT";

/// Operations exposed by [`SecretStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretOp {
    Describe,
    Put,
}

impl SecretOp {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Put)
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretCall {
    pub op: SecretOp,
    pub secret_id: String,
}

struct Container {
    metadata: SecretMetadata,
    versions: Vec<(String, SecretValue)>,
}

#[derive(Default)]
struct State {
    containers: HashMap<String, Container>,
    calls: Vec<SecretCall>,
    failures: HashMap<SecretOp, SecretsError>,
}

/// In-memory secret store
#[derive(Default)]
pub struct MemorySecretStore {
    state: Mutex<State>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an empty container
    pub fn with_container(self, secret_id: &str) -> Self {
        let metadata = SecretMetadata {
            name: Some(secret_id.to_string()),
            arn: Some(format!(
                "arn:aws:secretsmanager:us-east-1:000000000000:secret:{}",
                secret_id
            )),
            deleted_date: None,
            kms_key_id: None,
        };
        self.insert(secret_id, metadata);
        self
    }

    /// Provision a container that is scheduled for deletion
    pub fn with_deleted_container(self, secret_id: &str, deleted_at: DateTime<Utc>) -> Self {
        let metadata = SecretMetadata {
            name: Some(secret_id.to_string()),
            arn: None,
            deleted_date: Some(deleted_at),
            kms_key_id: None,
        };
        self.insert(secret_id, metadata);
        self
    }

    fn insert(&self, secret_id: &str, metadata: SecretMetadata) {
        self.state.lock().containers.insert(
            secret_id.to_string(),
            Container {
                metadata,
                versions: Vec::new(),
            },
        );
    }

    /// Make every subsequent call of `op` fail with `error`
    pub fn fail_on(&self, op: SecretOp, error: SecretsError) {
        self.state.lock().failures.insert(op, error);
    }

    pub fn calls(&self) -> Vec<SecretCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: SecretOp) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn version_count(&self, secret_id: &str) -> usize {
        self.state
            .lock()
            .containers
            .get(secret_id)
            .map(|c| c.versions.len())
            .unwrap_or(0)
    }

    /// Raw current value of a container; test inspection only
    pub fn current_value(&self, secret_id: &str) -> Option<String> {
        self.state
            .lock()
            .containers
            .get(secret_id)
            .and_then(|c| c.versions.last())
            .map(|(_, value)| value.expose_secret().to_string())
    }

    fn begin(&self, op: SecretOp, secret_id: &str) -> Result<parking_lot::MutexGuard<'_, State>, SecretsError> {
        let mut state = self.state.lock();
        state.calls.push(SecretCall {
            op,
            secret_id: secret_id.to_string(),
        });
        if let Some(error) = state.failures.get(&op) {
            return Err(error.clone());
        }
        Ok(state)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn describe(&self, secret_id: &str) -> Result<SecretMetadata, SecretsError> {
        let state = self.begin(SecretOp::Describe, secret_id)?;
        state
            .containers
            .get(secret_id)
            .map(|c| c.metadata.clone())
            .ok_or_else(|| SecretsError::NotFound(secret_id.to_string()))
    }

    async fn put_value(&self, secret_id: &str, payload: &SecretValue) -> Result<PutSecretOutcome, SecretsError> {
        let mut state = self.begin(SecretOp::Put, secret_id)?;
        let container = state
            .containers
            .get_mut(secret_id)
            .ok_or_else(|| SecretsError::NotFound(secret_id.to_string()))?;

        if container.metadata.is_scheduled_for_deletion() {
            return Err(SecretsError::ProviderError(format!(
                "secret {} is scheduled for deletion",
                secret_id
            )));
        }

        let version_id = format!("v{:04}", container.versions.len() + 1);
        container
            .versions
            .push((version_id.clone(), SecretValue::new(payload.expose_secret())));

        Ok(PutSecretOutcome {
            arn: container.metadata.arn.clone(),
            version_id: Some(version_id),
            version_stages: vec![CURRENT_STAGE.to_string()],
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_describe_missing_container() {
        let store = MemorySecretStore::new();
        let err = store.describe("lab/missing").await.unwrap_err();
        assert_eq!(err, SecretsError::NotFound("lab/missing".to_string()));
    }

    #[tokio::test]
    async fn test_put_versions_accumulate() {
        let store = MemorySecretStore::new().with_container("lab/app");

        let first = store.put_value("lab/app", &SecretValue::new("one")).await.unwrap();
        let second = store.put_value("lab/app", &SecretValue::new("two")).await.unwrap();

        assert_eq!(first.version_id.as_deref(), Some("v0001"));
        assert_eq!(second.version_id.as_deref(), Some("v0002"));
        assert_eq!(second.version_stages, vec!["AWSCURRENT".to_string()]);
        assert_eq!(store.current_value("lab/app").as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_put_never_creates_container() {
        let store = MemorySecretStore::new();
        assert!(store.put_value("lab/new", &SecretValue::new("x")).await.is_err());
        assert_eq!(store.version_count("lab/new"), 0);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemorySecretStore::new().with_container("lab/app");
        store.fail_on(SecretOp::Put, SecretsError::Unavailable("throttled".to_string()));

        assert!(store.put_value("lab/app", &SecretValue::new("x")).await.is_err());
        assert_eq!(store.call_count(SecretOp::Put), 1);
        assert_eq!(store.version_count("lab/app"), 0);
    }
}

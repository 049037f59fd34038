//! In-memory identity provider
//!
//! Holds principals and their credentials in process memory. Every call is
//! recorded so tests can assert exactly which operations were issued, and
//! individual operations can be made to fail.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use kw_common::SecretValue;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use crate::{
    CallerIdentity, CredentialMetadata, CredentialStatus, IdentityError, IdentityProvider,
    NewCredential,
};

/// Server-side per-principal key limit, mirroring IAM's default
const DEFAULT_KEY_LIMIT: usize = 2;

/// Operations exposed by [`IdentityProvider`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityOp {
    CallerIdentity,
    List,
    Create,
    SetStatus,
    Delete,
}

impl IdentityOp {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Create | Self::SetStatus | Self::Delete)
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityCall {
    pub op: IdentityOp,
    pub principal: Option<String>,
    pub credential_id: Option<String>,
}

#[derive(Default)]
struct State {
    principals: HashMap<String, Vec<CredentialMetadata>>,
    calls: Vec<IdentityCall>,
    failures: HashMap<IdentityOp, IdentityError>,
    issued: u64,
}

/// In-memory identity provider with call recording and failure injection
pub struct MemoryIdentityProvider {
    caller: CallerIdentity,
    key_limit: usize,
    state: Mutex<State>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self {
            caller: CallerIdentity {
                account: Some("000000000000".to_string()),
                arn: Some("arn:aws:iam::000000000000:user/keyward-operator".to_string()),
                user_id: Some("AIDAKEYWARDOPERATOR".to_string()),
            },
            key_limit: DEFAULT_KEY_LIMIT,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_caller(mut self, caller: CallerIdentity) -> Self {
        self.caller = caller;
        self
    }

    /// Override the server-side key limit enforced on create
    pub fn with_key_limit(mut self, limit: usize) -> Self {
        self.key_limit = limit;
        self
    }

    /// Register a principal with the given credentials
    pub fn with_principal(self, principal: &str, credentials: Vec<CredentialMetadata>) -> Self {
        self.state
            .lock()
            .principals
            .insert(principal.to_string(), credentials);
        self
    }

    /// Make every subsequent call of `op` fail with `error`
    pub fn fail_on(&self, op: IdentityOp, error: IdentityError) {
        self.state.lock().failures.insert(op, error);
    }

    /// Stop failing `op`
    pub fn clear_failure(&self, op: IdentityOp) {
        self.state.lock().failures.remove(&op);
    }

    /// Calls issued so far, in order
    pub fn calls(&self) -> Vec<IdentityCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of `op` issued so far
    pub fn call_count(&self, op: IdentityOp) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Calls that changed identity-system state
    pub fn mutating_calls(&self) -> Vec<IdentityCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op.is_mutating())
            .cloned()
            .collect()
    }

    /// Current credentials of `principal`
    pub fn credentials(&self, principal: &str) -> Vec<CredentialMetadata> {
        self.state
            .lock()
            .principals
            .get(principal)
            .cloned()
            .unwrap_or_default()
    }

    fn begin(
        &self,
        op: IdentityOp,
        principal: Option<&str>,
        credential_id: Option<&str>,
    ) -> Result<parking_lot::MutexGuard<'_, State>, IdentityError> {
        let mut state = self.state.lock();
        state.calls.push(IdentityCall {
            op,
            principal: principal.map(str::to_string),
            credential_id: credential_id.map(str::to_string),
        });
        if let Some(error) = state.failures.get(&op) {
            return Err(error.clone());
        }
        Ok(state)
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn caller_identity(&self) -> Result<CallerIdentity, IdentityError> {
        let _state = self.begin(IdentityOp::CallerIdentity, None, None)?;
        Ok(self.caller.clone())
    }

    async fn list_credentials(&self, principal: &str) -> Result<Vec<CredentialMetadata>, IdentityError> {
        let state = self.begin(IdentityOp::List, Some(principal), None)?;
        state
            .principals
            .get(principal)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(format!("principal {}", principal)))
    }

    async fn create_credential(&self, principal: &str) -> Result<NewCredential, IdentityError> {
        let mut state = self.begin(IdentityOp::Create, Some(principal), None)?;
        let key_limit = self.key_limit;

        let existing = state
            .principals
            .get(principal)
            .map(Vec::len)
            .ok_or_else(|| IdentityError::NotFound(format!("principal {}", principal)))?;
        if existing >= key_limit {
            return Err(IdentityError::LimitExceeded(format!(
                "principal {} already has {} access keys",
                principal, existing
            )));
        }

        state.issued += 1;
        let serial = state.issued;
        let id = format!("AKIAMEM{:013}", serial);
        let secret = SecretValue::new(format!("memSecret/{:08}/k7MDENGbPxRfiCYEXAMPLEKEY", serial));
        let created_at = Utc::now() + Duration::milliseconds(serial as i64);

        if let Some(credentials) = state.principals.get_mut(principal) {
            credentials.push(CredentialMetadata::new(
                id.clone(),
                CredentialStatus::Active,
                created_at,
            ));
        }
        debug!(principal, credential_id = %id, "Issued in-memory credential");

        Ok(NewCredential {
            id,
            secret,
            created_at,
            status: CredentialStatus::Active,
        })
    }

    async fn set_status(
        &self,
        principal: &str,
        credential_id: &str,
        status: CredentialStatus,
    ) -> Result<(), IdentityError> {
        let mut state = self.begin(IdentityOp::SetStatus, Some(principal), Some(credential_id))?;
        let credential = state
            .principals
            .get_mut(principal)
            .and_then(|creds| creds.iter_mut().find(|c| c.id == credential_id))
            .ok_or_else(|| IdentityError::NotFound(format!("access key {}", credential_id)))?;
        credential.status = status;
        Ok(())
    }

    async fn delete_credential(&self, principal: &str, credential_id: &str) -> Result<(), IdentityError> {
        let mut state = self.begin(IdentityOp::Delete, Some(principal), Some(credential_id))?;
        let credentials = state
            .principals
            .get_mut(principal)
            .ok_or_else(|| IdentityError::NotFound(format!("principal {}", principal)))?;
        let before = credentials.len();
        credentials.retain(|c| c.id != credential_id);
        if credentials.len() == before {
            return Err(IdentityError::NotFound(format!("access key {}", credential_id)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

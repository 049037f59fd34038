//! Keyward Identity Providers
//!
//! Access-key lifecycle operations against an external identity system:
//! - In-memory provider (tests, local dry runs)
//! - AWS IAM + STS (with feature flag `aws`)
//!
//! Providers are expected to retry transient failures themselves. Callers
//! treat any returned error as final for the step that issued it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kw_common::SecretValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod memory;

pub use memory::{IdentityCall, IdentityOp, MemoryIdentityProvider};

#[cfg(feature = "aws")]
mod aws;
#[cfg(feature = "aws")]
pub use aws::AwsIamProvider;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Credential status as reported by the identity system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialStatus {
    Active,
    Inactive,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialStatus::Active => write!(f, "Active"),
            CredentialStatus::Inactive => write!(f, "Inactive"),
        }
    }
}

/// One existing credential of a principal. Never carries secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub id: String,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
}

impl CredentialMetadata {
    pub fn new(id: impl Into<String>, status: CredentialStatus, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status,
            created_at,
        }
    }
}

/// Select the oldest credential: earliest creation time, ties broken by id.
pub fn oldest_credential(credentials: &[CredentialMetadata]) -> Option<&CredentialMetadata> {
    credentials
        .iter()
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}

/// Identity of the caller whose credentials perform the rotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub account: Option<String>,
    pub arn: Option<String>,
    pub user_id: Option<String>,
}

/// A freshly issued credential. The secret half is only ever held as a
/// [`SecretValue`].
#[derive(Debug)]
pub struct NewCredential {
    pub id: String,
    pub secret: SecretValue,
    pub created_at: DateTime<Utc>,
    pub status: CredentialStatus,
}

/// Identity provider trait
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Identity of the caller, used to verify the process is authenticated
    async fn caller_identity(&self) -> Result<CallerIdentity, IdentityError>;

    /// All credentials currently issued to `principal`
    async fn list_credentials(&self, principal: &str) -> Result<Vec<CredentialMetadata>, IdentityError>;

    /// Issue a new credential for `principal`
    async fn create_credential(&self, principal: &str) -> Result<NewCredential, IdentityError>;

    /// Change the status of an existing credential
    async fn set_status(
        &self,
        principal: &str,
        credential_id: &str,
        status: CredentialStatus,
    ) -> Result<(), IdentityError>;

    /// Permanently delete a credential
    async fn delete_credential(&self, principal: &str, credential_id: &str) -> Result<(), IdentityError>;

    /// Provider name
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_oldest_by_creation_time() {
        let keys = vec![
            CredentialMetadata::new("AKIAB", CredentialStatus::Active, at(200)),
            CredentialMetadata::new("AKIAC", CredentialStatus::Inactive, at(100)),
            CredentialMetadata::new("AKIAA", CredentialStatus::Active, at(300)),
        ];
        assert_eq!(oldest_credential(&keys).unwrap().id, "AKIAC");
    }

    #[test]
    fn test_oldest_tie_broken_by_id() {
        let keys = vec![
            CredentialMetadata::new("AKIAZ", CredentialStatus::Active, at(100)),
            CredentialMetadata::new("AKIAM", CredentialStatus::Active, at(100)),
        ];
        assert_eq!(oldest_credential(&keys).unwrap().id, "AKIAM");

        let reversed: Vec<_> = keys.into_iter().rev().collect();
        assert_eq!(oldest_credential(&reversed).unwrap().id, "AKIAM");
    }

    #[test]
    fn test_oldest_of_empty_is_none() {
        assert!(oldest_credential(&[]).is_none());
    }
}

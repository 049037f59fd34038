//! Keyward Secret Stores
//!
//! Publishing side of a rotation. A store exposes exactly two operations:
//! describe a secret container (existence and metadata, never the value) and
//! put a new current version. Containers are provisioned out of band; no
//! store creates one implicitly.
//!
//! Backends:
//! - In-memory (tests, local dry runs)
//! - AWS Secrets Manager (with feature flag `aws`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kw_common::SecretValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;

pub use memory::{MemorySecretStore, SecretCall, SecretOp};

#[cfg(feature = "aws")]
mod aws;
#[cfg(feature = "aws")]
pub use aws::AwsSecretsManagerStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretsError {
    #[error("Secret not found: {0}")]
    NotFound(String),
    #[error("Secret store unavailable: {0}")]
    Unavailable(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Descriptor of a secret container, as returned by describe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    pub name: Option<String>,
    pub arn: Option<String>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub kms_key_id: Option<String>,
}

impl SecretMetadata {
    /// A container scheduled for deletion rejects new versions
    pub fn is_scheduled_for_deletion(&self) -> bool {
        self.deleted_date.is_some()
    }
}

/// Result of publishing a new secret version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutSecretOutcome {
    pub arn: Option<String>,
    pub version_id: Option<String>,
    pub version_stages: Vec<String>,
}

/// Secret store trait
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Describe a container without reading its value
    async fn describe(&self, secret_id: &str) -> Result<SecretMetadata, SecretsError>;

    /// Publish `payload` as the current version of an existing container
    async fn put_value(&self, secret_id: &str, payload: &SecretValue) -> Result<PutSecretOutcome, SecretsError>;

    /// Store name
    fn name(&self) -> &str;
}

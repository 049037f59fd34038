//! AWS Secrets Manager store
//!
//! Secret ids may be given as plain names/ARNs or as `aws-sm://secret-name`
//! references. The store only ever calls `DescribeSecret` and
//! `PutSecretValue`; it never reads a secret value back.

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::primitives::DateTime as AwsDateTime;
use aws_sdk_secretsmanager::Client;
use chrono::{DateTime, Utc};
use kw_common::SecretValue;
use tracing::{debug, info};

use crate::{PutSecretOutcome, SecretMetadata, SecretStore, SecretsError};

const REFERENCE_PREFIX: &str = "aws-sm://";

/// AWS Secrets Manager secret store
pub struct AwsSecretsManagerStore {
    client: Client,
}

impl AwsSecretsManagerStore {
    /// Create a store from a loaded SDK configuration
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        info!(region = ?config.region(), "Initialized AWS Secrets Manager store");
        Self {
            client: Client::new(config),
        }
    }

    /// Strip an optional `aws-sm://` prefix
    pub fn secret_name(reference: &str) -> &str {
        reference.strip_prefix(REFERENCE_PREFIX).unwrap_or(reference)
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManagerStore {
    async fn describe(&self, secret_id: &str) -> Result<SecretMetadata, SecretsError> {
        let name = Self::secret_name(secret_id);
        debug!(secret_name = %name, "Describing secret");

        let response = self
            .client
            .describe_secret()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| classify(e, name))?;

        Ok(SecretMetadata {
            name: response.name().map(str::to_string),
            arn: response.arn().map(str::to_string),
            deleted_date: response.deleted_date().and_then(to_chrono),
            kms_key_id: response.kms_key_id().map(str::to_string),
        })
    }

    async fn put_value(&self, secret_id: &str, payload: &SecretValue) -> Result<PutSecretOutcome, SecretsError> {
        let name = Self::secret_name(secret_id);
        debug!(secret_name = %name, "Putting new secret version");

        // No VersionStages: the new version is labelled AWSCURRENT
        let response = self
            .client
            .put_secret_value()
            .secret_id(name)
            .secret_string(payload.expose_secret())
            .send()
            .await
            .map_err(|e| classify(e, name))?;

        Ok(PutSecretOutcome {
            arn: response.arn().map(str::to_string),
            version_id: response.version_id().map(str::to_string),
            version_stages: response.version_stages().to_vec(),
        })
    }

    fn name(&self) -> &str {
        "aws-sm"
    }
}

fn classify<E, R>(err: SdkError<E, R>, secret_name: &str) -> SecretsError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => SecretsError::Unavailable(message),
        _ => match err.code() {
            Some("ResourceNotFoundException") => SecretsError::NotFound(secret_name.to_string()),
            Some("InternalServiceError") => SecretsError::Unavailable(message),
            _ => SecretsError::ProviderError(format!(
                "Secrets Manager request failed for {}: {}",
                secret_name, message
            )),
        },
    }
}

fn to_chrono(ts: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_name_strips_prefix() {
        assert_eq!(AwsSecretsManagerStore::secret_name("aws-sm://lab/iam/user"), "lab/iam/user");
        assert_eq!(AwsSecretsManagerStore::secret_name("lab/iam/user"), "lab/iam/user");
    }
}

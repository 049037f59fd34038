//! AWS IAM identity provider
//!
//! Access keys are managed through IAM; the caller is verified through STS
//! `GetCallerIdentity`. Credentials and region come from the shared
//! [`aws_config::SdkConfig`] so the SDK's own retry policy applies.

use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_iam::primitives::DateTime as AwsDateTime;
use aws_sdk_iam::types::{AccessKeyMetadata, StatusType};
use chrono::{DateTime, Utc};
use kw_common::SecretValue;
use tracing::{debug, info};

use crate::{
    CallerIdentity, CredentialMetadata, CredentialStatus, IdentityError, IdentityProvider,
    NewCredential,
};

/// AWS IAM + STS identity provider
pub struct AwsIamProvider {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

impl AwsIamProvider {
    /// Create a provider from a loaded SDK configuration
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        info!(region = ?config.region(), "Initialized AWS IAM identity provider");
        Self {
            iam: aws_sdk_iam::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}

#[async_trait]
impl IdentityProvider for AwsIamProvider {
    async fn caller_identity(&self) -> Result<CallerIdentity, IdentityError> {
        let response = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| classify(e, "caller identity"))?;

        Ok(CallerIdentity {
            account: response.account().map(str::to_string),
            arn: response.arn().map(str::to_string),
            user_id: response.user_id().map(str::to_string),
        })
    }

    async fn list_credentials(&self, principal: &str) -> Result<Vec<CredentialMetadata>, IdentityError> {
        let mut credentials = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .iam
                .list_access_keys()
                .user_name(principal)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify(e, &format!("user {}", principal)))?;

            for key in response.access_key_metadata() {
                credentials.push(convert_metadata(key)?);
            }

            marker = response.marker().map(str::to_string);
            if !response.is_truncated() || marker.is_none() {
                break;
            }
        }

        debug!(principal, count = credentials.len(), "Listed access keys");
        Ok(credentials)
    }

    async fn create_credential(&self, principal: &str) -> Result<NewCredential, IdentityError> {
        let response = self
            .iam
            .create_access_key()
            .user_name(principal)
            .send()
            .await
            .map_err(|e| classify(e, &format!("user {}", principal)))?;

        let key = response.access_key().ok_or_else(|| {
            IdentityError::ProviderError("CreateAccessKey returned no access key".to_string())
        })?;

        Ok(NewCredential {
            id: key.access_key_id().to_string(),
            secret: SecretValue::new(key.secret_access_key()),
            created_at: key.create_date().and_then(to_chrono).unwrap_or_else(Utc::now),
            status: convert_status(key.status()),
        })
    }

    async fn set_status(
        &self,
        principal: &str,
        credential_id: &str,
        status: CredentialStatus,
    ) -> Result<(), IdentityError> {
        let status = match status {
            CredentialStatus::Active => StatusType::Active,
            CredentialStatus::Inactive => StatusType::Inactive,
        };

        self.iam
            .update_access_key()
            .user_name(principal)
            .access_key_id(credential_id)
            .status(status)
            .send()
            .await
            .map_err(|e| classify(e, &format!("access key {}", credential_id)))?;
        Ok(())
    }

    async fn delete_credential(&self, principal: &str, credential_id: &str) -> Result<(), IdentityError> {
        self.iam
            .delete_access_key()
            .user_name(principal)
            .access_key_id(credential_id)
            .send()
            .await
            .map_err(|e| classify(e, &format!("access key {}", credential_id)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "aws-iam"
    }
}

fn classify<E, R>(err: SdkError<E, R>, subject: &str) -> IdentityError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            IdentityError::ProviderUnavailable(message)
        }
        _ => match err.code() {
            Some("NoSuchEntity") => IdentityError::NotFound(subject.to_string()),
            Some("LimitExceeded") => IdentityError::LimitExceeded(message),
            Some("ServiceFailure") | Some("Throttling") => IdentityError::ProviderUnavailable(message),
            _ => IdentityError::ProviderError(message),
        },
    }
}

fn convert_metadata(key: &AccessKeyMetadata) -> Result<CredentialMetadata, IdentityError> {
    let id = key
        .access_key_id()
        .ok_or_else(|| IdentityError::ProviderError("access key metadata without id".to_string()))?;
    let created_at = key.create_date().and_then(to_chrono).ok_or_else(|| {
        IdentityError::ProviderError(format!("access key {} has no create date", id))
    })?;
    let status = key
        .status()
        .map(convert_status)
        .unwrap_or(CredentialStatus::Inactive);

    Ok(CredentialMetadata::new(id, status, created_at))
}

fn convert_status(status: &StatusType) -> CredentialStatus {
    match status {
        StatusType::Active => CredentialStatus::Active,
        _ => CredentialStatus::Inactive,
    }
}

fn to_chrono(ts: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

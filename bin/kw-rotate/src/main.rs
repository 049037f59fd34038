//! Keyward rotation CLI
//!
//! Rotates one principal's access key:
//! - verifies the caller and checks the key-count guardrail
//! - creates a new key and publishes it to an existing secret container
//! - optionally deactivates or deletes the old key
//! - writes an evidence record and prints a sanitized JSON summary
//!
//! Logs go to stderr; stdout carries only the summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use clap::Parser;
use tracing::{error, info};

use kw_config::{AppConfig, ConfigLoader};
use kw_identity::AwsIamProvider;
use kw_rotation::{
    FileEvidenceSink, RetireMode, RotationError, RotationOrchestrator, RotationRequest,
};
use kw_secrets::AwsSecretsManagerStore;

const DEFAULT_REGION: &str = "us-east-1";

/// Guarded access-key rotation
#[derive(Parser, Debug)]
#[command(name = "kw-rotate")]
#[command(about = "Rotate an access key, publish it to a secret container and record evidence")]
struct Args {
    /// Principal (IAM user) whose key is rotated
    #[arg(long, visible_alias = "user-name", env = "KEYWARD_PRINCIPAL")]
    principal: String,

    /// Existing secret container that receives the new key
    #[arg(long, env = "KEYWARD_SECRET_ID")]
    secret_id: String,

    /// AWS region (falls back to config, then the SDK default chain, then us-east-1)
    #[arg(long)]
    region: Option<String>,

    /// Endpoint override, e.g. a LocalStack URL
    #[arg(long)]
    endpoint_url: Option<String>,

    /// Abort when the principal already holds this many keys
    #[arg(long)]
    max_keys: Option<usize>,

    /// Run every check and record the plan without changing anything
    #[arg(long)]
    dry_run: bool,

    /// What to do with the old key: none, deactivate, delete
    #[arg(long)]
    retire_mode: Option<String>,

    /// Required for delete; must be exactly DELETE
    #[arg(long, visible_alias = "confirm-delete", default_value = "")]
    confirm_token: String,

    /// Legacy: same as --retire-mode deactivate
    #[arg(long, conflicts_with_all = ["retire_mode", "delete_old"])]
    deactivate_old: bool,

    /// Legacy: same as --retire-mode delete
    #[arg(long, conflicts_with = "retire_mode")]
    delete_old: bool,

    /// Base directory for evidence records
    #[arg(long)]
    evidence_dir: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Args {
    /// Retire mode from the flags, or the configured default
    fn retire_mode(&self, config: &AppConfig) -> Result<RetireMode, RotationError> {
        if self.delete_old {
            return Ok(RetireMode::Delete);
        }
        if self.deactivate_old {
            return Ok(RetireMode::Deactivate);
        }
        self.retire_mode
            .as_deref()
            .unwrap_or(config.rotation.retire_mode.as_str())
            .parse()
    }

    fn build_request(&self, config: &AppConfig) -> Result<RotationRequest, RotationError> {
        let mut builder = RotationRequest::builder(self.principal.as_str(), self.secret_id.as_str())
            .max_existing_keys(self.max_keys.unwrap_or(config.rotation.max_existing_keys))
            .dry_run(self.dry_run)
            .retire_mode(self.retire_mode(config)?)
            .confirm_token(self.confirm_token.as_str());

        if let Some(region) = self.region.as_deref().or(config.region()) {
            builder = builder.region(region);
        }
        if let Some(endpoint_url) = self.endpoint_url.as_deref().or(config.endpoint_url()) {
            builder = builder.endpoint_url(endpoint_url);
        }
        builder.build()
    }
}

async fn load_sdk_config(request: &RotationRequest, profile: Option<&str>) -> aws_config::SdkConfig {
    let region = RegionProviderChain::first_try(request.region().map(|r| Region::new(r.to_string())))
        .or_default_provider()
        .or_else(Region::from_static(DEFAULT_REGION));

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint_url) = request.endpoint_url() {
        loader = loader.endpoint_url(endpoint_url);
    }
    loader.load().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize logging (JSON if LOG_FORMAT=json, text otherwise)
    kw_common::logging::init_logging("kw-rotate");

    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    let request = match args.build_request(&config) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Invalid rotation request");
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    let sdk_config = load_sdk_config(&request, config.profile()).await;
    info!(region = ?sdk_config.region(), "AWS configuration loaded");

    let evidence_dir = args
        .evidence_dir
        .clone()
        .unwrap_or_else(|| config.rotation.evidence_dir.clone());

    let orchestrator = RotationOrchestrator::new(
        Arc::new(AwsIamProvider::from_sdk_config(&sdk_config)),
        Arc::new(AwsSecretsManagerStore::from_sdk_config(&sdk_config)),
        Arc::new(FileEvidenceSink::new(evidence_dir)),
    );

    let outcome = orchestrator.rotate(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome.summary())?);

    std::process::exit(outcome.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["kw-rotate", "--principal", "alice", "--secret-id", "lab/iam/alice"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_config_defaults_apply() {
        let mut config = AppConfig::default();
        config.aws.region = "eu-west-1".to_string();
        config.rotation.max_existing_keys = 3;

        let request = parse(&[]).build_request(&config).unwrap();

        assert_eq!(request.region(), Some("eu-west-1"));
        assert_eq!(request.max_existing_keys(), 3);
        assert_eq!(request.retire_mode(), RetireMode::None);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = AppConfig::default();
        config.aws.region = "eu-west-1".to_string();

        let request = parse(&["--region", "us-west-2", "--max-keys", "1", "--retire-mode", "deactivate"])
            .build_request(&config)
            .unwrap();

        assert_eq!(request.region(), Some("us-west-2"));
        assert_eq!(request.max_existing_keys(), 1);
        assert_eq!(request.retire_mode(), RetireMode::Deactivate);
    }

    #[test]
    fn test_legacy_flags() {
        let args = Args::try_parse_from([
            "kw-rotate",
            "--user-name",
            "alice",
            "--secret-id",
            "lab/iam/alice",
            "--delete-old",
            "--confirm-delete",
            "DELETE",
        ])
        .unwrap();

        let request = args.build_request(&AppConfig::default()).unwrap();
        assert_eq!(request.principal(), "alice");
        assert_eq!(request.retire_mode(), RetireMode::Delete);
    }

    #[test]
    fn test_legacy_retire_flags_conflict() {
        let err = Args::try_parse_from([
            "kw-rotate",
            "--principal",
            "alice",
            "--secret-id",
            "lab/iam/alice",
            "--deactivate-old",
            "--delete-old",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_delete_without_token_is_usage_error() {
        let err = parse(&["--retire-mode", "delete"])
            .build_request(&AppConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_unknown_retire_mode() {
        let err = parse(&["--retire-mode", "archive"])
            .build_request(&AppConfig::default())
            .unwrap_err();
        assert!(matches!(err, RotationError::Usage(_)));
    }
}

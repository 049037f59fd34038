//! Keyward Configuration System
//!
//! TOML-based configuration with environment variable overrides. Command-line
//! flags are applied on top by the binary; library crates never read the
//! process environment themselves.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Retire modes accepted in configuration
pub const RETIRE_MODES: &[&str] = &["none", "deactivate", "delete"];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub aws: AwsConfig,
    pub rotation: RotationConfig,
}

/// AWS client configuration.
///
/// Empty strings mean "use the SDK default provider chain".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    /// Endpoint override, e.g. a LocalStack URL
    pub endpoint_url: String,
    /// Named profile from the shared AWS config files
    pub profile: String,
}

/// Rotation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Abort when the principal already holds this many keys
    pub max_existing_keys: usize,
    /// Base directory for evidence output
    pub evidence_dir: String,
    /// Default retire mode: none, deactivate, delete
    pub retire_mode: String,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            max_existing_keys: 2,
            evidence_dir: "evidence/rotation".to_string(),
            retire_mode: "none".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check values that TOML typing alone cannot enforce
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !RETIRE_MODES.contains(&self.rotation.retire_mode.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "rotation.retire_mode must be one of {:?}, got {:?}",
                RETIRE_MODES, self.rotation.retire_mode
            )));
        }
        if self.rotation.evidence_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "rotation.evidence_dir cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Region override, if one is configured
    pub fn region(&self) -> Option<&str> {
        non_empty(&self.aws.region)
    }

    /// Endpoint override, if one is configured
    pub fn endpoint_url(&self) -> Option<&str> {
        non_empty(&self.aws.endpoint_url)
    }

    /// Profile override, if one is configured
    pub fn profile(&self) -> Option<&str> {
        non_empty(&self.aws.profile)
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Keyward Configuration
# Environment variables (KEYWARD_*) override these settings,
# command-line flags override both.

[aws]
region = ""        # empty: AWS_REGION / profile / us-east-1
endpoint_url = ""  # e.g. http://localhost:4566 for LocalStack
profile = ""

[rotation]
max_existing_keys = 2
evidence_dir = "evidence/rotation"
retire_mode = "none"  # none, deactivate, delete
"#
        .to_string()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.rotation.max_existing_keys, 2);
        assert_eq!(config.rotation.retire_mode, "none");
        assert!(config.region().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_toml_parses() {
        let config: AppConfig = toml::from_str(&AppConfig::example_toml()).unwrap();
        assert_eq!(config.rotation.evidence_dir, "evidence/rotation");
        assert!(config.endpoint_url().is_none());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[aws]\nregion = \"eu-west-1\"\n\n[rotation]\nmax_existing_keys = 1").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.region(), Some("eu-west-1"));
        assert_eq!(config.rotation.max_existing_keys, 1);
        assert_eq!(config.rotation.retire_mode, "none");
    }

    #[test]
    fn test_validate_rejects_unknown_retire_mode() {
        let mut config = AppConfig::default();
        config.rotation.retire_mode = "shred".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }
}

//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "keyward.toml",
    "config.toml",
    "./config/keyward.toml",
    "/etc/keyward/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = &self.config_path {
            // An explicitly requested file must exist
            if !path.exists() {
                return Err(ConfigError::ValidationError(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("KEYWARD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `KEYWARD_*` overrides using the given variable lookup
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // AWS
    if let Some(val) = lookup("KEYWARD_AWS_REGION") {
        config.aws.region = val;
    }
    if let Some(val) = lookup("KEYWARD_AWS_ENDPOINT_URL") {
        config.aws.endpoint_url = val;
    }
    if let Some(val) = lookup("KEYWARD_AWS_PROFILE") {
        config.aws.profile = val;
    }

    // Rotation
    if let Some(val) = lookup("KEYWARD_MAX_EXISTING_KEYS") {
        if let Ok(max) = val.parse() {
            config.rotation.max_existing_keys = max;
        }
    }
    if let Some(val) = lookup("KEYWARD_EVIDENCE_DIR") {
        config.rotation.evidence_dir = val;
    }
    if let Some(val) = lookup("KEYWARD_RETIRE_MODE") {
        config.rotation.retire_mode = val.to_lowercase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("KEYWARD_AWS_REGION", "ap-south-1"),
                ("KEYWARD_MAX_EXISTING_KEYS", "1"),
                ("KEYWARD_RETIRE_MODE", "Deactivate"),
            ]),
        );

        assert_eq!(config.aws.region, "ap-south-1");
        assert_eq!(config.rotation.max_existing_keys, 1);
        assert_eq!(config.rotation.retire_mode, "deactivate");
    }

    #[test]
    fn test_unparseable_number_is_ignored() {
        let mut config = AppConfig::default();
        apply_overrides(&mut config, lookup_from(&[("KEYWARD_MAX_EXISTING_KEYS", "many")]));
        assert_eq!(config.rotation.max_existing_keys, 2);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let loader = ConfigLoader::with_path("/definitely/not/here/keyward.toml");
        assert!(matches!(loader.load(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyward.toml");
        std::fs::write(&path, "[rotation]\nevidence_dir = \"/tmp/kw-evidence\"\n").unwrap();

        let config = ConfigLoader::with_path(&path).load().unwrap();
        assert_eq!(config.rotation.evidence_dir, "/tmp/kw-evidence");
    }
}

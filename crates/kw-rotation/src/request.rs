//! Rotation request and input validation
//!
//! A [`RotationRequest`] can only be obtained through
//! [`RotationRequestBuilder::build`], so every request the orchestrator sees
//! has already passed validation. In particular `RetireMode::Delete` never
//! reaches a remote call without the exact confirmation token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RotationError;

/// Literal confirmation required for `RetireMode::Delete`
pub const CONFIRM_DELETE_TOKEN: &str = "DELETE";

/// Default ceiling on existing keys
pub const DEFAULT_MAX_EXISTING_KEYS: usize = 2;

/// What to do with the old credential once the new one is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetireMode {
    #[default]
    None,
    Deactivate,
    Delete,
}

impl RetireMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetireMode::None => "none",
            RetireMode::Deactivate => "deactivate",
            RetireMode::Delete => "delete",
        }
    }
}

impl fmt::Display for RetireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetireMode {
    type Err = RotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RetireMode::None),
            "deactivate" => Ok(RetireMode::Deactivate),
            "delete" => Ok(RetireMode::Delete),
            other => Err(RotationError::Usage(format!(
                "unknown retire mode {:?}, expected none, deactivate or delete",
                other
            ))),
        }
    }
}

/// Validated, immutable input of one rotation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRequest {
    principal: String,
    secret_id: String,
    region: Option<String>,
    endpoint_url: Option<String>,
    max_existing_keys: usize,
    dry_run: bool,
    retire_mode: RetireMode,
}

impl RotationRequest {
    pub fn builder(principal: impl Into<String>, secret_id: impl Into<String>) -> RotationRequestBuilder {
        RotationRequestBuilder::new(principal, secret_id)
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret_id(&self) -> &str {
        &self.secret_id
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn endpoint_url(&self) -> Option<&str> {
        self.endpoint_url.as_deref()
    }

    pub fn max_existing_keys(&self) -> usize {
        self.max_existing_keys
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn retire_mode(&self) -> RetireMode {
        self.retire_mode
    }
}

/// Builder for [`RotationRequest`]
#[derive(Debug, Clone)]
pub struct RotationRequestBuilder {
    principal: String,
    secret_id: String,
    region: Option<String>,
    endpoint_url: Option<String>,
    max_existing_keys: usize,
    dry_run: bool,
    retire_mode: RetireMode,
    confirm_token: Option<String>,
}

impl RotationRequestBuilder {
    pub fn new(principal: impl Into<String>, secret_id: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            secret_id: secret_id.into(),
            region: None,
            endpoint_url: None,
            max_existing_keys: DEFAULT_MAX_EXISTING_KEYS,
            dry_run: false,
            retire_mode: RetireMode::None,
            confirm_token: None,
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn max_existing_keys(mut self, max: usize) -> Self {
        self.max_existing_keys = max;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn retire_mode(mut self, mode: RetireMode) -> Self {
        self.retire_mode = mode;
        self
    }

    pub fn confirm_token(mut self, token: impl Into<String>) -> Self {
        self.confirm_token = Some(token.into());
        self
    }

    /// Validate and freeze the request
    pub fn build(self) -> Result<RotationRequest, RotationError> {
        if self.principal.trim().is_empty() {
            return Err(RotationError::Usage("principal is required".to_string()));
        }
        if self.secret_id.trim().is_empty() {
            return Err(RotationError::Usage("secret container id is required".to_string()));
        }
        if self.retire_mode == RetireMode::Delete
            && self.confirm_token.as_deref() != Some(CONFIRM_DELETE_TOKEN)
        {
            return Err(RotationError::Usage(format!(
                "retire mode delete requires confirmation token {}",
                CONFIRM_DELETE_TOKEN
            )));
        }

        Ok(RotationRequest {
            principal: self.principal,
            secret_id: self.secret_id,
            region: self.region.filter(|r| !r.trim().is_empty()),
            endpoint_url: self.endpoint_url.filter(|e| !e.trim().is_empty()),
            max_existing_keys: self.max_existing_keys,
            dry_run: self.dry_run,
            retire_mode: self.retire_mode,
        })
    }
}

//! Pre-mutation guardrail on the number of existing keys

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailVerdict {
    Continue,
    AbortTooMany,
}

impl GuardrailVerdict {
    pub fn is_abort(&self) -> bool {
        matches!(self, GuardrailVerdict::AbortTooMany)
    }
}

/// Aborts a rotation when the principal already holds `ceiling` or more keys.
///
/// The count is taken before the new key is created, so a ceiling of 2
/// allows rotating a principal that currently has exactly one key.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardrailPolicy;

impl GuardrailPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, existing_count: usize, ceiling: usize) -> GuardrailVerdict {
        if existing_count >= ceiling {
            GuardrailVerdict::AbortTooMany
        } else {
            GuardrailVerdict::Continue
        }
    }
}

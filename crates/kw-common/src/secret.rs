//! Secret material wrapper and redaction.
//!
//! A [`SecretValue`] owns raw credential material. Its `Debug` and `Display`
//! implementations only ever print the redacted tail, it cannot be cloned or
//! serialized, and its buffer is wiped on drop. The raw value is reachable
//! only through [`SecretValue::expose_secret`], which should appear at the
//! handful of call sites that hand the value to a secret store.

use std::fmt;
use zeroize::Zeroizing;

/// Number of trailing characters left visible by [`redacted_tail`].
pub const REDACT_KEEP_LAST: usize = 4;

/// Mask every character except the last `keep_last`.
///
/// Values no longer than `keep_last` are masked entirely.
pub fn redacted_tail(value: &str, keep_last: usize) -> String {
    let len = value.chars().count();
    if keep_last == 0 || len <= keep_last {
        return "*".repeat(len);
    }
    let tail: String = value.chars().skip(len - keep_last).collect();
    format!("{}{}", "*".repeat(len - keep_last), tail)
}

/// Raw secret material, e.g. a newly issued secret access key.
pub struct SecretValue(Zeroizing<String>);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    /// Borrow the raw value.
    pub fn expose_secret(&self) -> &str {
        self.0.as_str()
    }

    /// Redacted form safe for logs, evidence and console output.
    pub fn redacted(&self) -> String {
        redacted_tail(&self.0, REDACT_KEEP_LAST)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretValue").field(&self.redacted()).finish()
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_tail_keeps_last_four() {
        assert_eq!(redacted_tail("wJalrXUtnFEMIK7MDENG", 4), "****************DENG");
    }

    #[test]
    fn test_redacted_tail_short_values_fully_masked() {
        assert_eq!(redacted_tail("abcd", 4), "****");
        assert_eq!(redacted_tail("ab", 4), "**");
        assert_eq!(redacted_tail("", 4), "");
    }

    #[test]
    fn test_redacted_tail_zero_keep() {
        assert_eq!(redacted_tail("secret", 0), "******");
    }

    #[test]
    fn test_redacted_tail_counts_chars_not_bytes() {
        assert_eq!(redacted_tail("ééééé1234", 4), "*****1234");
    }

    #[test]
    fn test_debug_and_display_never_show_raw_value() {
        let secret = SecretValue::new("super-secret-value-XYZ9");
        let debug = format!("{:?}", secret);
        let display = format!("{}", secret);

        assert!(!debug.contains("super-secret"));
        assert!(!display.contains("super-secret"));
        assert!(display.ends_with("XYZ9"));
        assert_eq!(secret.expose_secret(), "super-secret-value-XYZ9");
    }
}

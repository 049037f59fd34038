//! Keyward Common
//!
//! Types shared by every keyward crate: logging setup, the [`SecretValue`]
//! wrapper that keeps raw credential material out of logs and evidence, and
//! small UTC time helpers.

pub mod logging;
pub mod secret;

pub use secret::{redacted_tail, SecretValue, REDACT_KEEP_LAST};

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as an RFC 3339 string with microsecond precision.
pub fn utc_now_iso() -> String {
    to_iso(&Utc::now())
}

/// Format a timestamp the same way evidence and payloads expect it.
pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

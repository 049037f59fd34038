//! Secret payload published for consumers of the rotated credential

use chrono::{DateTime, Utc};
use kw_common::{to_iso, SecretValue};
use serde::Serialize;

const PAYLOAD_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct CredentialPayload<'a> {
    schema_version: u32,
    user_name: &'a str,
    access_key_id: &'a str,
    secret_access_key: &'a str,
    rotated_at: String,
    rotated_from_access_key_id: Option<&'a str>,
}

/// Serialize the payload straight into a [`SecretValue`]
pub(crate) fn build_payload(
    principal: &str,
    access_key_id: &str,
    secret: &SecretValue,
    rotated_from: Option<&str>,
    rotated_at: DateTime<Utc>,
) -> Result<SecretValue, serde_json::Error> {
    let payload = CredentialPayload {
        schema_version: PAYLOAD_SCHEMA_VERSION,
        user_name: principal,
        access_key_id,
        secret_access_key: secret.expose_secret(),
        rotated_at: to_iso(&rotated_at),
        rotated_from_access_key_id: rotated_from,
    };
    serde_json::to_string(&payload).map(SecretValue::new)
}

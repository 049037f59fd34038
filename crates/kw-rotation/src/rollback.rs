//! Compensation for a credential created by a run whose publication failed

use kw_identity::IdentityProvider;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    Ok,
    Failed(String),
}

impl RollbackOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, RollbackOutcome::Ok)
    }
}

/// Deletes the just-created credential. Attempted once; the provider's own
/// retry policy is the only retry.
pub struct RollbackAction<'a> {
    identity: &'a dyn IdentityProvider,
}

impl<'a> RollbackAction<'a> {
    pub fn new(identity: &'a dyn IdentityProvider) -> Self {
        Self { identity }
    }

    pub async fn compensate(&self, principal: &str, created_id: &str) -> RollbackOutcome {
        warn!(principal, access_key_id = created_id, "Rolling back newly created access key");
        match self.identity.delete_credential(principal, created_id).await {
            Ok(()) => RollbackOutcome::Ok,
            Err(e) => {
                error!(
                    principal,
                    access_key_id = created_id,
                    error = %e,
                    "Rollback failed: orphaned access key remains"
                );
                RollbackOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kw_identity::{CredentialMetadata, CredentialStatus, IdentityError, IdentityOp, MemoryIdentityProvider};

    fn provider() -> MemoryIdentityProvider {
        MemoryIdentityProvider::new().with_principal(
            "alice",
            vec![CredentialMetadata::new("AKIANEW", CredentialStatus::Active, Utc::now())],
        )
    }

    #[tokio::test]
    async fn test_compensate_deletes_created_key() {
        let identity = provider();
        let outcome = RollbackAction::new(&identity).compensate("alice", "AKIANEW").await;

        assert!(outcome.is_ok());
        assert!(identity.credentials("alice").is_empty());
    }

    #[tokio::test]
    async fn test_compensate_reports_failure_once() {
        let identity = provider();
        identity.fail_on(
            IdentityOp::Delete,
            IdentityError::ProviderUnavailable("throttled".to_string()),
        );

        let outcome = RollbackAction::new(&identity).compensate("alice", "AKIANEW").await;

        assert!(matches!(outcome, RollbackOutcome::Failed(ref msg) if msg.contains("throttled")));
        assert_eq!(identity.call_count(IdentityOp::Delete), 1);
    }
}

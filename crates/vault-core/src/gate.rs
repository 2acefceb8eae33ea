//! Master-key verification gate
//!
//! The gate is stateless: every call takes the username and master key
//! explicitly and answers with a one-shot [`VerificationResult`]. Callers
//! decide whether a verification is a login or a step-up for one action.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::{generate_password, hash_master_key, verify_master_key, HashParams, SecretString};
use crate::error::Result;
use crate::identity::{Identity, IdentityStore};

/// Outcome of one verification attempt. Never persisted.
#[derive(Debug)]
pub struct VerificationResult {
    granted: bool,
    identity: Option<Identity>,
}

impl VerificationResult {
    fn denied() -> Self {
        Self {
            granted: false,
            identity: None,
        }
    }

    fn granted(identity: Identity) -> Self {
        Self {
            granted: true,
            identity: Some(identity),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Identity snapshot, present only when granted
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn into_identity(self) -> Option<Identity> {
        self.identity
    }
}

/// Re-authenticates a principal against the local identity store
pub struct VerificationGate {
    identities: Arc<dyn IdentityStore>,
    /// Checked when the username is unknown so both failure paths do the same work
    decoy_hash: String,
}

impl VerificationGate {
    pub fn new(identities: Arc<dyn IdentityStore>, params: &HashParams) -> Result<Self> {
        let decoy_hash = hash_master_key(&generate_password(32), params)?;
        Ok(Self {
            identities,
            decoy_hash,
        })
    }

    /// Verify a master key for a username.
    ///
    /// Empty input is rejected without touching the identity store. Unknown
    /// users, wrong keys and store faults all produce the same denied result.
    pub async fn verify(&self, username: &str, master_key: &SecretString) -> VerificationResult {
        if username.is_empty() || master_key.is_empty() {
            debug!("Rejected verification with empty credentials");
            return VerificationResult::denied();
        }

        let identity = match self.identities.get_by_username(username).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Identity lookup failed during verification: {}", e);
                None
            }
        };

        let stored_hash = identity
            .as_ref()
            .map(|identity| identity.master_key_hash.clone())
            .unwrap_or_else(|| self.decoy_hash.clone());

        let candidate = master_key.clone();
        let matched = tokio::task::spawn_blocking(move || {
            verify_master_key(candidate.expose(), &stored_hash)
        })
        .await
        .unwrap_or(false);

        match identity {
            Some(identity) if matched => {
                debug!("Verification granted for {}", identity.username);
                VerificationResult::granted(identity)
            }
            _ => {
                debug!("Verification denied");
                VerificationResult::denied()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CloudLink;
    use crate::test_support::{register, TestIdentityStore};

    async fn test_gate() -> (VerificationGate, Arc<TestIdentityStore>) {
        let store = Arc::new(TestIdentityStore::new().await);
        register(&store, "alice", "correct-key").await;
        let gate = VerificationGate::new(store.clone(), &HashParams::fast()).unwrap();
        (gate, store)
    }

    #[tokio::test]
    async fn test_correct_key_granted_with_snapshot() {
        let (gate, store) = test_gate().await;
        let alice = store.get_by_username("alice").await.unwrap().unwrap();
        store
            .inner()
            .update(alice.id, crate::identity::IdentityPatch::cloud(CloudLink::enabled("r1")))
            .await
            .unwrap();

        let result = gate.verify("alice", &SecretString::new("correct-key")).await;

        assert!(result.is_granted());
        let snapshot = result.into_identity().unwrap();
        assert_eq!(snapshot.id, alice.id);
        assert!(snapshot.cloud_enabled());
        assert_eq!(snapshot.remote_id(), Some("r1"));
    }

    #[tokio::test]
    async fn test_wrong_key_and_unknown_user_look_identical() {
        let (gate, _store) = test_gate().await;

        let wrong_key = gate.verify("alice", &SecretString::new("wrong")).await;
        let unknown = gate.verify("nobody", &SecretString::new("x")).await;

        assert!(!wrong_key.is_granted());
        assert!(!unknown.is_granted());
        assert!(wrong_key.identity().is_none());
        assert!(unknown.identity().is_none());
        assert_eq!(format!("{:?}", wrong_key), format!("{:?}", unknown));
    }

    #[tokio::test]
    async fn test_empty_input_skips_store() {
        let (gate, store) = test_gate().await;
        let before = store.lookup_count();

        assert!(!gate.verify("", &SecretString::new("correct-key")).await.is_granted());
        assert!(!gate.verify("alice", &SecretString::new("")).await.is_granted());

        assert_eq!(store.lookup_count(), before);
    }

    #[tokio::test]
    async fn test_store_failure_denies() {
        let (gate, store) = test_gate().await;
        store.set_fail_reads(true);

        let result = gate.verify("alice", &SecretString::new("correct-key")).await;
        assert!(!result.is_granted());
    }
}

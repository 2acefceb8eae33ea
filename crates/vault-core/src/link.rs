//! Cloud link coordination
//!
//! Enabling the remote mirror provisions a remote identity when the local
//! identity has none, then records `{remoteId, cloudEnabled}` as one write.
//! Disabling only clears the flag; the remote identity is kept so that a later
//! enable does not provision again.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::identity::{CloudLink, Identity, IdentityPatch, IdentityStore};
use crate::remote::{ConnectionManager, RemoteProvisioner};

/// Link state of one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    Disabled,
    Provisioning,
    Linked,
    Disabling,
}

/// Speculative change of a displayed value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Durable value
    Committed(bool),
    /// Shown as `proposed` while the durable write is in flight
    Pending { prior: bool, proposed: bool },
    /// The durable write failed and `prior` is shown again
    Reverted(bool),
}

/// Session-local view of the cloud switch, flipped before the durable write completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloudToggle {
    transition: Transition,
}

impl CloudToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            transition: Transition::Committed(enabled),
        }
    }

    /// Value to display
    pub fn displayed(&self) -> bool {
        match self.transition {
            Transition::Committed(value) | Transition::Reverted(value) => value,
            Transition::Pending { proposed, .. } => proposed,
        }
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    fn begin(&mut self, proposed: bool) {
        self.transition = Transition::Pending {
            prior: self.displayed(),
            proposed,
        };
    }

    fn commit(&mut self) {
        if let Transition::Pending { proposed, .. } = self.transition {
            self.transition = Transition::Committed(proposed);
        }
    }

    fn revert(&mut self) {
        if let Transition::Pending { prior, .. } = self.transition {
            self.transition = Transition::Reverted(prior);
        }
    }
}

type InFlight = std::sync::Mutex<HashMap<Uuid, LinkState>>;

/// Marks one identity as changing; the mark is cleared when dropped, including
/// when the future holding it is cancelled
struct TransitionGuard<'a> {
    in_flight: &'a InFlight,
    identity_id: Uuid,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.identity_id);
    }
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<Uuid, LinkState>> {
    in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sole writer of an identity's cloud link
pub struct CloudLinkCoordinator {
    identities: Arc<dyn IdentityStore>,
    provisioner: Arc<dyn RemoteProvisioner>,
    connections: Arc<ConnectionManager>,
    /// Bound on remote identity creation
    request_timeout: Duration,
    /// Identities with a transition in flight
    in_flight: InFlight,
    /// Remote identities provisioned but not yet recorded locally
    unrecorded: Mutex<HashMap<Uuid, String>>,
}

impl CloudLinkCoordinator {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        provisioner: Arc<dyn RemoteProvisioner>,
        connections: Arc<ConnectionManager>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            identities,
            provisioner,
            connections,
            request_timeout,
            in_flight: std::sync::Mutex::new(HashMap::new()),
            unrecorded: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of an identity's link
    pub fn state(&self, identity: &Identity) -> LinkState {
        if let Some(state) = lock(&self.in_flight).get(&identity.id) {
            return *state;
        }
        if identity.cloud_enabled() {
            LinkState::Linked
        } else {
            LinkState::Disabled
        }
    }

    /// Remote identity provisioned for this identity whose link is not recorded yet
    pub async fn unrecorded_remote_id(&self, identity_id: Uuid) -> Option<String> {
        self.unrecorded.lock().await.get(&identity_id).cloned()
    }

    /// Drop any unrecorded remote identity kept for a local identity (account deletion)
    pub async fn forget(&self, identity_id: Uuid) {
        if let Some(remote_id) = self.unrecorded.lock().await.remove(&identity_id) {
            debug!("Forgot unrecorded remote identity {}", remote_id);
        }
    }

    pub async fn set_enabled(
        &self,
        identity: &mut Identity,
        view: &mut CloudToggle,
        enabled: bool,
    ) -> Result<()> {
        if enabled {
            self.enable(identity, view).await
        } else {
            self.disable(identity, view).await
        }
    }

    /// Switch the mirror on. No-op when already linked.
    ///
    /// On success `identity` holds the recorded link. On failure the view is
    /// reverted and the identity store is unchanged; `identity` may then carry
    /// a newly provisioned remote id so a retry only repeats the local write.
    pub async fn enable(&self, identity: &mut Identity, view: &mut CloudToggle) -> Result<()> {
        if identity.cloud_enabled() {
            debug!("Cloud already enabled for {}", identity.username);
            *view = CloudToggle::new(true);
            return Ok(());
        }

        let guard = self.begin(identity.id, LinkState::Provisioning)?;
        view.begin(true);

        let result = self.link(identity).await;
        drop(guard);

        match result {
            Ok(()) => {
                view.commit();
                info!("Cloud enabled for {}", identity.username);
                Ok(())
            }
            Err(e) => {
                view.revert();
                warn!("Enabling cloud for {} failed: {}", identity.username, e);
                Err(e)
            }
        }
    }

    async fn link(&self, identity: &mut Identity) -> Result<()> {
        let pending = self.unrecorded_remote_id(identity.id).await;
        let existing = identity.remote_id().map(str::to_string);

        let (remote_id, recorded) = match (existing, pending) {
            (_, Some(remote_id)) => {
                debug!("Reusing unrecorded remote identity {}", remote_id);
                (remote_id, false)
            }
            (Some(remote_id), None) => (remote_id, true),
            (None, None) => {
                let remote_id = self.provision(identity).await?;
                (remote_id, false)
            }
        };

        // Known to this session even if the local write below fails
        if identity.remote_id() != Some(remote_id.as_str()) {
            identity.cloud = CloudLink::dormant(remote_id.clone());
        }

        let patch = IdentityPatch::cloud(CloudLink::enabled(remote_id.clone()));
        match self.identities.update(identity.id, patch).await {
            Ok(updated) => {
                self.unrecorded.lock().await.remove(&identity.id);
                identity.cloud = updated.cloud;
                Ok(())
            }
            Err(e) if recorded => Err(persistence_error(e)),
            Err(e) => Err(VaultError::InconsistentLink {
                remote_id,
                cause: e.to_string(),
            }),
        }
    }

    async fn provision(&self, identity: &Identity) -> Result<String> {
        info!("No remote identity for {}, provisioning one", identity.username);

        self.connections.ensure_connected(None).await?;
        let remote_id = tokio::time::timeout(
            self.request_timeout,
            self.provisioner.create_remote_identity(&identity.username),
        )
        .await
        .map_err(|_| {
            VaultError::ProvisioningFailed(format!(
                "timed out after {}ms",
                self.request_timeout.as_millis()
            ))
        })??;

        info!("Provisioned remote identity {} for {}", remote_id, identity.username);
        self.unrecorded
            .lock()
            .await
            .insert(identity.id, remote_id.clone());
        Ok(remote_id)
    }

    /// Switch the mirror off, keeping the remote identity. No-op when already off.
    pub async fn disable(&self, identity: &mut Identity, view: &mut CloudToggle) -> Result<()> {
        if !identity.cloud_enabled() {
            debug!("Cloud already disabled for {}", identity.username);
            *view = CloudToggle::new(false);
            return Ok(());
        }

        let guard = self.begin(identity.id, LinkState::Disabling)?;
        view.begin(false);

        let patch = IdentityPatch::cloud(identity.cloud.disabled());
        let result = self.identities.update(identity.id, patch).await;
        drop(guard);

        match result {
            Ok(updated) => {
                identity.cloud = updated.cloud;
                view.commit();
                info!("Cloud disabled for {}", identity.username);
                Ok(())
            }
            Err(e) => {
                view.revert();
                warn!("Disabling cloud for {} failed: {}", identity.username, e);
                Err(persistence_error(e))
            }
        }
    }

    fn begin(&self, identity_id: Uuid, state: LinkState) -> Result<TransitionGuard<'_>> {
        let mut in_flight = lock(&self.in_flight);
        if in_flight.contains_key(&identity_id) {
            return Err(VaultError::validation(
                "A cloud integration change is already in progress",
            ));
        }
        in_flight.insert(identity_id, state);

        Ok(TransitionGuard {
            in_flight: &self.in_flight,
            identity_id,
        })
    }
}

fn persistence_error(e: VaultError) -> VaultError {
    match e {
        VaultError::NotFound(_) | VaultError::PersistenceFailed(_) => e,
        other => VaultError::PersistenceFailed(other.to_string()),
    }
}

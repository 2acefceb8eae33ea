//! Session control
//!
//! A session starts with a master-key login and decides once which record
//! store backs it. Revealing or editing a record additionally needs a
//! [`StepUpGrant`] obtained by re-entering the master key for that action.
//! Results of calls that outlive their session (logout while in flight) are
//! discarded.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};
use crate::gate::VerificationGate;
use crate::identity::{Identity, IdentityStore, IdentityView};
use crate::link::{CloudLinkCoordinator, CloudToggle};
use crate::record::{NewRecord, OwnerKey, RecordId, RecordPatch, RecordStore, RecordSummary};
use crate::remote::ConnectionManager;

/// Which store backs a session, resolved when the session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordRoute {
    /// Local store, keyed by the local identity id
    Local { owner: OwnerKey },
    /// Remote store, keyed by the remote identity id
    Remote { owner: OwnerKey },
}

impl RecordRoute {
    pub fn local(identity: &Identity) -> Self {
        Self::Local {
            owner: OwnerKey::new(identity.id.to_string()),
        }
    }

    pub fn remote(remote_id: &str) -> Self {
        Self::Remote {
            owner: OwnerKey::new(remote_id),
        }
    }

    pub fn owner(&self) -> &OwnerKey {
        match self {
            Self::Local { owner } | Self::Remote { owner } => owner,
        }
    }

    pub fn routing(&self) -> Routing {
        match self {
            Self::Local { .. } => Routing::LocalOnly,
            Self::Remote { .. } => Routing::CloudLinked,
        }
    }
}

/// Caller-visible routing flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Routing {
    LocalOnly,
    CloudLinked,
}

/// Result of a successful login or cloud toggle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub identity: IdentityView,
    pub routing: Routing,
    /// Non-fatal problem, e.g. the session fell back to local-only
    pub warning: Option<String>,
}

/// Proof that the master key was re-entered for one action.
///
/// Consumed by the action it authorizes and only valid in the session that
/// issued it.
#[derive(Debug)]
pub struct StepUpGrant {
    epoch: u64,
    identity_id: Uuid,
}

struct ActiveSession {
    epoch: u64,
    identity: Identity,
    route: RecordRoute,
    view: CloudToggle,
}

/// Post-login routing and gating of record operations
pub struct SessionController {
    gate: Arc<VerificationGate>,
    coordinator: Arc<CloudLinkCoordinator>,
    connections: Arc<ConnectionManager>,
    identities: Arc<dyn IdentityStore>,
    local: Arc<dyn RecordStore>,
    remote: Arc<dyn RecordStore>,
    session: RwLock<Option<ActiveSession>>,
    epoch: AtomicU64,
}

impl SessionController {
    pub fn new(
        gate: Arc<VerificationGate>,
        coordinator: Arc<CloudLinkCoordinator>,
        connections: Arc<ConnectionManager>,
        identities: Arc<dyn IdentityStore>,
        local: Arc<dyn RecordStore>,
        remote: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            gate,
            coordinator,
            connections,
            identities,
            local,
            remote,
            session: RwLock::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    /// Log in, replacing any current session.
    ///
    /// A cloud-enabled identity whose remote store cannot be reached still
    /// logs in: the link is switched off and the session runs local-only.
    pub async fn login(&self, username: &str, master_key: &SecretString) -> Result<SessionStatus> {
        let verification = self.gate.verify(username, master_key).await;
        let mut identity = match verification.into_identity() {
            Some(identity) => identity,
            None => return Err(VaultError::AuthFailed),
        };

        let mut view = CloudToggle::new(identity.cloud_enabled());
        let mut warning = None;

        let linked = identity
            .remote_id()
            .filter(|_| identity.cloud_enabled())
            .map(str::to_string);

        let route = match linked {
            Some(remote_id) => match self.connections.ensure_connected(Some(&remote_id)).await {
                Ok(()) => RecordRoute::remote(&remote_id),
                Err(e) => {
                    warn!("Cloud unreachable for {}, continuing local-only: {}", identity.username, e);
                    warning = Some(self.demote(&mut identity, &mut view, e).await);
                    RecordRoute::local(&identity)
                }
            },
            None => RecordRoute::local(&identity),
        };

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let status = SessionStatus {
            identity: IdentityView::from(&identity),
            routing: route.routing(),
            warning,
        };

        info!("Logged in {} ({:?})", identity.username, status.routing);
        *self.session.write().await = Some(ActiveSession {
            epoch,
            identity,
            route,
            view,
        });

        Ok(status)
    }

    /// Switch the link off after a failed connect and describe what happened
    async fn demote(&self, identity: &mut Identity, view: &mut CloudToggle, cause: VaultError) -> String {
        match self.coordinator.disable(identity, view).await {
            Ok(()) => format!(
                "Cloud database unavailable ({}); cloud integration has been turned off",
                cause
            ),
            Err(e) => {
                warn!("Could not record local-only fallback: {}", e);
                format!(
                    "Cloud database unavailable ({}); continuing with local passwords only",
                    cause
                )
            }
        }
    }

    /// End the session. Calls still in flight for it are discarded.
    pub async fn logout(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.session.write().await.take() {
            info!("Logged out {}", session.identity.username);
        }
    }

    pub async fn current(&self) -> Option<SessionStatus> {
        self.session.read().await.as_ref().map(|session| SessionStatus {
            identity: IdentityView::from(&session.identity),
            routing: session.route.routing(),
            warning: None,
        })
    }

    /// Displayed state of the cloud switch for the current session
    pub async fn cloud_toggle(&self) -> Option<CloudToggle> {
        self.session.read().await.as_ref().map(|session| session.view)
    }

    async fn snapshot(&self) -> Result<(u64, Identity, RecordRoute)> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| (session.epoch, session.identity.clone(), session.route.clone()))
            .ok_or(VaultError::NoSession)
    }

    fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.epoch.load(Ordering::SeqCst) == epoch {
            Ok(())
        } else {
            debug!("Discarding result of an ended session");
            Err(VaultError::NoSession)
        }
    }

    fn store_for(&self, route: &RecordRoute) -> &Arc<dyn RecordStore> {
        match route {
            RecordRoute::Local { .. } => &self.local,
            RecordRoute::Remote { .. } => &self.remote,
        }
    }

    /// Re-verify the session user's master key for one sensitive action
    pub async fn step_up(&self, master_key: &SecretString) -> Result<StepUpGrant> {
        let (epoch, identity, _) = self.snapshot().await?;

        let verification = self.gate.verify(&identity.username, master_key).await;
        self.ensure_current(epoch)?;

        match verification.identity() {
            Some(verified) if verified.id == identity.id => Ok(StepUpGrant {
                epoch,
                identity_id: identity.id,
            }),
            _ => Err(VaultError::AuthFailed),
        }
    }

    /// Route for a grant, if it was issued by the current session
    async fn redeem(&self, grant: StepUpGrant) -> Result<(u64, Identity, RecordRoute)> {
        let (epoch, identity, route) = self.snapshot().await?;

        if grant.epoch != epoch || grant.identity_id != identity.id {
            warn!("Rejected step-up grant from another session");
            return Err(VaultError::AuthFailed);
        }
        Ok((epoch, identity, route))
    }

    pub async fn list_records(&self) -> Result<Vec<RecordSummary>> {
        let (epoch, _, route) = self.snapshot().await?;

        let records = self.store_for(&route).list_by_owner(route.owner()).await?;
        self.ensure_current(epoch)?;

        Ok(records.iter().map(|record| record.summary()).collect())
    }

    pub async fn create_record(&self, record: NewRecord) -> Result<RecordId> {
        record.validate()?;
        let (epoch, _, route) = self.snapshot().await?;

        let id = self.store_for(&route).create(route.owner(), record).await?;
        self.ensure_current(epoch)?;
        Ok(id)
    }

    /// Reveal one secret
    pub async fn reveal(&self, grant: StepUpGrant, id: &RecordId) -> Result<SecretString> {
        let (epoch, _, route) = self.redeem(grant).await?;

        let records = self.store_for(&route).list_by_owner(route.owner()).await?;
        self.ensure_current(epoch)?;

        records
            .into_iter()
            .find(|record| &record.id == id)
            .map(|record| record.secret)
            .ok_or_else(|| VaultError::NotFound(format!("record {}", id)))
    }

    /// Edit one record
    pub async fn update_record(&self, grant: StepUpGrant, id: &RecordId, patch: RecordPatch) -> Result<()> {
        patch.validate()?;
        let (epoch, _, route) = self.redeem(grant).await?;

        self.store_for(&route).update(route.owner(), id, patch).await?;
        self.ensure_current(epoch)
    }

    pub async fn delete_record(&self, id: &RecordId) -> Result<()> {
        let (epoch, _, route) = self.snapshot().await?;

        self.store_for(&route).delete(route.owner(), id).await?;
        self.ensure_current(epoch)
    }

    /// Switch the remote mirror for the session identity.
    ///
    /// Existing records stay where they are. After enabling, new records go to
    /// the remote store if it can be reached; otherwise the session stays
    /// local-only with a warning.
    pub async fn set_cloud_enabled(&self, enabled: bool) -> Result<SessionStatus> {
        let (epoch, mut identity, route) = self.snapshot().await?;
        let mut view = self
            .cloud_toggle()
            .await
            .unwrap_or_else(|| CloudToggle::new(identity.cloud_enabled()));

        let result = self
            .coordinator
            .set_enabled(&mut identity, &mut view, enabled)
            .await;

        let mut warning = None;
        let linked = identity
            .remote_id()
            .filter(|_| identity.cloud_enabled())
            .map(str::to_string);

        let route = match (&result, linked) {
            (Ok(()), Some(remote_id)) => {
                match self.connections.ensure_connected(Some(&remote_id)).await {
                    Ok(()) => RecordRoute::remote(&remote_id),
                    Err(e) => {
                        warning = Some(format!(
                            "Cloud integration enabled but the cloud database is unavailable ({}); using local passwords until next login",
                            e
                        ));
                        RecordRoute::local(&identity)
                    }
                }
            }
            (Ok(()), _) => RecordRoute::local(&identity),
            (Err(_), _) => route,
        };

        let mut session = self.session.write().await;
        match session.as_mut() {
            Some(active) if active.epoch == epoch => {
                active.identity = identity.clone();
                active.view = view;
                active.route = route.clone();
            }
            _ => return Err(result.err().unwrap_or(VaultError::NoSession)),
        }
        drop(session);

        result?;
        Ok(SessionStatus {
            identity: IdentityView::from(&identity),
            routing: route.routing(),
            warning,
        })
    }

    /// Delete the session identity and its local records, then end the session.
    /// Remote records are left untouched.
    ///
    /// The identity goes first: records left behind by a later failure are
    /// unreachable, while an identity without its records would not be.
    pub async fn delete_account(&self, grant: StepUpGrant) -> Result<()> {
        let (_, identity, _) = self.redeem(grant).await?;

        self.identities.delete(identity.id).await?;
        self.coordinator.forget(identity.id).await;

        let local_owner = RecordRoute::local(&identity);
        match self.local.delete_by_owner(local_owner.owner()).await {
            Ok(removed) => info!(
                "Deleted account {} and {} local records",
                identity.username, removed
            ),
            Err(e) => warn!(
                "Deleted account {} but not its local records: {}",
                identity.username, e
            ),
        }

        self.logout().await;
        Ok(())
    }
}

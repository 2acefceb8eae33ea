//! Main vault orchestration
//!
//! `Vault` wires the stores, the remote connection and the session controller
//! together and is the boundary callers talk to. Every operation returns a
//! [`Response`] envelope; failures are reported in it, never raised.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::{generate_password, hash_master_key, SecretString, MAX_PASSWORD_LENGTH};
use crate::error::{Result, VaultError};
use crate::gate::VerificationGate;
use crate::identity::{Identity, IdentityStore, IdentityView, JsonIdentityStore};
use crate::link::CloudLinkCoordinator;
use crate::record::{
    LocalRecordStore, NewRecord, RecordId, RecordPatch, RecordStore, RecordSummary,
    RemoteRecordStore,
};
use crate::remote::{
    ConnectionManager, HttpTransport, OfflineTransport, RemoteProvisioner, RemoteTransport,
};
use crate::response::Response;
use crate::session::{SessionController, SessionStatus};
use crate::settings::{Settings, SettingsManager};
use crate::storage::default_data_dir;

/// Password vault with an optional remote mirror
pub struct Vault {
    data_dir: PathBuf,
    settings: Settings,
    identities: Arc<dyn IdentityStore>,
    connections: Arc<ConnectionManager>,
    session: SessionController,
}

impl Vault {
    /// Open the vault in `data_dir`, or the platform data directory when `None`.
    ///
    /// The remote mirror uses the HTTP transport when a remote URI is
    /// configured; without one, cloud-enabled logins fall back to local-only.
    pub async fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        tokio::fs::create_dir_all(&data_dir).await?;

        let settings = SettingsManager::new(&data_dir).get().clone();

        match settings.remote.uri.clone() {
            Some(uri) => {
                let transport = Arc::new(HttpTransport::new(
                    &uri,
                    settings.remote.request_timeout(),
                )?);
                Self::with_components(&data_dir, settings, transport).await
            }
            None => {
                debug!("No remote URI configured, cloud mirror unavailable");
                Self::with_components(&data_dir, settings, Arc::new(OfflineTransport)).await
            }
        }
    }

    /// Open the vault with explicit settings and remote transport
    pub async fn with_components<T>(data_dir: &Path, settings: Settings, transport: Arc<T>) -> Result<Self>
    where
        T: RemoteTransport + RemoteProvisioner + 'static,
    {
        let identities: Arc<dyn IdentityStore> = Arc::new(JsonIdentityStore::open(data_dir).await?);
        let local: Arc<dyn RecordStore> = Arc::new(LocalRecordStore::open(data_dir).await?);

        let mut vault = Self::assemble(settings, identities, local, transport)?;
        vault.data_dir = data_dir.to_path_buf();
        Ok(vault)
    }

    fn assemble<T>(
        settings: Settings,
        identities: Arc<dyn IdentityStore>,
        local: Arc<dyn RecordStore>,
        transport: Arc<T>,
    ) -> Result<Self>
    where
        T: RemoteTransport + RemoteProvisioner + 'static,
    {
        let remote_transport: Arc<dyn RemoteTransport> = transport.clone();
        let provisioner: Arc<dyn RemoteProvisioner> = transport;

        info!(
            "Opening vault (identities: {}, remote: {})",
            identities.backend_name(),
            remote_transport.backend_name()
        );

        let connections = Arc::new(ConnectionManager::new(
            remote_transport.clone(),
            settings.remote.default_database.clone(),
            settings.remote.connect_timeout(),
        ));
        let remote: Arc<dyn RecordStore> = Arc::new(RemoteRecordStore::new(
            remote_transport,
            settings.remote.request_timeout(),
        ));

        let gate = Arc::new(VerificationGate::new(identities.clone(), &settings.hashing)?);
        let coordinator = Arc::new(CloudLinkCoordinator::new(
            identities.clone(),
            provisioner,
            connections.clone(),
            settings.remote.request_timeout(),
        ));

        let session = SessionController::new(
            gate,
            coordinator,
            connections.clone(),
            identities.clone(),
            local,
            remote,
        );

        Ok(Self {
            data_dir: PathBuf::new(),
            settings,
            identities,
            connections,
            session,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create a local identity with cloud integration off
    pub async fn register(&self, username: &str, master_key: &str) -> Response<IdentityView> {
        Response::from_result(
            self.create_identity(username, master_key).await,
            "Account created",
        )
    }

    async fn create_identity(&self, username: &str, master_key: &str) -> Result<IdentityView> {
        let username = username.trim();
        if username.is_empty() {
            return Err(VaultError::validation("Username not provided"));
        }
        if master_key.is_empty() {
            return Err(VaultError::validation("Master key not provided"));
        }
        if self.identities.get_by_username(username).await?.is_some() {
            return Err(VaultError::validation("Username already taken"));
        }

        let key = SecretString::new(master_key);
        let params = self.settings.hashing;
        let hash = tokio::task::spawn_blocking(move || hash_master_key(key.expose(), &params))
            .await
            .map_err(|e| VaultError::CryptoError(e.to_string()))??;

        let identity = Identity::new(username, hash);
        self.identities.insert(identity.clone()).await?;

        info!("Registered {}", identity.username);
        Ok(IdentityView::from(&identity))
    }

    /// Start a session. A cloud connection failure is reported as a warning, not a failure.
    pub async fn login(&self, username: &str, master_key: &str) -> Response<SessionStatus> {
        match self.session.login(username, &SecretString::new(master_key)).await {
            Ok(status) => {
                let message = status
                    .warning
                    .clone()
                    .unwrap_or_else(|| "Login successful".to_string());
                Response::ok(message, status)
            }
            Err(e) => Response::failure(&e),
        }
    }

    pub async fn logout(&self) -> Response<()> {
        self.session.logout().await;
        Response::ok("Logged out", ())
    }

    /// Check the session user's master key without authorizing anything
    pub async fn step_up_verify(&self, username: &str, master_key: &str) -> Response<()> {
        Response::from_result(
            self.verify_session_user(username, master_key).await,
            "Master key verified",
        )
    }

    async fn verify_session_user(&self, username: &str, master_key: &str) -> Result<()> {
        let current = self.session.current().await.ok_or(VaultError::NoSession)?;
        if current.identity.username != username {
            return Err(VaultError::AuthFailed);
        }
        self.session.step_up(&SecretString::new(master_key)).await?;
        Ok(())
    }

    /// Session status for the given identity
    async fn session_for(&self, identity_id: Uuid) -> Result<SessionStatus> {
        let current = self.session.current().await.ok_or(VaultError::NoSession)?;
        if current.identity.id != identity_id {
            warn!("Rejected operation for an identity outside the session");
            return Err(VaultError::AuthFailed);
        }
        Ok(current)
    }

    /// Turn the remote mirror on or off for the logged-in identity
    pub async fn set_cloud_enabled(&self, identity_id: Uuid, enabled: bool) -> Response<SessionStatus> {
        let result = match self.session_for(identity_id).await {
            Ok(_) => self.session.set_cloud_enabled(enabled).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(status) => {
                let message = status.warning.clone().unwrap_or_else(|| {
                    if enabled {
                        "Cloud integration enabled".to_string()
                    } else {
                        "Cloud integration disabled".to_string()
                    }
                });
                Response::ok(message, status)
            }
            Err(e) => Response::failure(&e),
        }
    }

    pub async fn create_record(&self, service: &str, username: &str, password: &str) -> Response<RecordId> {
        let record = NewRecord::new(service.trim(), username.trim(), password);
        Response::from_result(self.session.create_record(record).await, "Password saved")
    }

    /// Records of the logged-in identity, without secrets
    pub async fn list_records(&self, identity_id: Uuid) -> Response<Vec<RecordSummary>> {
        let result = match self.session_for(identity_id).await {
            Ok(_) => self.session.list_records().await,
            Err(e) => Err(e),
        };

        Response::from_result(result, "Passwords loaded")
    }

    /// Reveal one secret; the master key is verified for this action only
    pub async fn reveal_record(&self, record_id: &str, master_key: &str) -> Response<SecretString> {
        Response::from_result(
            self.reveal_with_step_up(record_id, master_key).await,
            "Password revealed",
        )
    }

    async fn reveal_with_step_up(&self, record_id: &str, master_key: &str) -> Result<SecretString> {
        let grant = self.session.step_up(&SecretString::new(master_key)).await?;
        self.session.reveal(grant, &RecordId::new(record_id)).await
    }

    /// Edit one record; the master key is verified for this action only
    pub async fn update_record(&self, record_id: &str, patch: RecordPatch, master_key: &str) -> Response<()> {
        Response::from_result(
            self.update_with_step_up(record_id, patch, master_key).await,
            "Password updated",
        )
    }

    async fn update_with_step_up(&self, record_id: &str, patch: RecordPatch, master_key: &str) -> Result<()> {
        patch.validate()?;
        let grant = self.session.step_up(&SecretString::new(master_key)).await?;
        self.session
            .update_record(grant, &RecordId::new(record_id), patch)
            .await
    }

    pub async fn delete_record(&self, record_id: &str) -> Response<()> {
        Response::from_result(
            self.session.delete_record(&RecordId::new(record_id)).await,
            "Password deleted",
        )
    }

    /// Delete the logged-in identity and its local records
    pub async fn delete_account(&self, master_key: &str) -> Response<()> {
        let result = match self.session.step_up(&SecretString::new(master_key)).await {
            Ok(grant) => self.session.delete_account(grant).await,
            Err(e) => Err(e),
        };

        Response::from_result(result, "Account deleted")
    }

    pub fn generate_password(&self, length: usize) -> Response<String> {
        if length > MAX_PASSWORD_LENGTH {
            let err = VaultError::validation(format!(
                "Password length must be at most {}",
                MAX_PASSWORD_LENGTH
            ));
            return Response::failure(&err);
        }
        Response::ok("Password generated", generate_password(length))
    }

    /// Close the remote connection (process exit)
    pub async fn shutdown(&self) -> Result<()> {
        self.session.logout().await;
        self.connections.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::HashParams;
    use crate::error::ErrorKind;
    use crate::remote::MemoryTransport;
    use crate::session::Routing;
    use crate::test_support::TestIdentityStore;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_settings() -> Settings {
        Settings {
            hashing: HashParams::fast(),
            ..Settings::default()
        }
    }

    async fn test_vault() -> (Vault, Arc<MemoryTransport>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let vault = Vault::with_components(temp_dir.path(), fast_settings(), transport.clone())
            .await
            .unwrap();
        (vault, transport, temp_dir)
    }

    /// Vault whose identity store can be made to fail
    async fn failing_vault() -> (Vault, Arc<TestIdentityStore>, Arc<MemoryTransport>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(TestIdentityStore::new().await);
        let local = Arc::new(LocalRecordStore::open(temp_dir.path()).await.unwrap());
        let transport = Arc::new(MemoryTransport::new());
        let vault = Vault::assemble(fast_settings(), store.clone(), local, transport.clone()).unwrap();
        (vault, store, transport, temp_dir)
    }

    async fn stored(vault: &Vault, username: &str) -> Identity {
        vault
            .identities
            .get_by_username(username)
            .await
            .unwrap()
            .unwrap()
    }

    async fn login_id(vault: &Vault, username: &str) -> Uuid {
        let response = vault.login(username, "mk").await;
        assert!(response.success, "{}", response.message);
        response.data.unwrap().identity.id
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (vault, _transport, _temp) = test_vault().await;

        let response = vault.register("  ", "mk").await;
        assert_eq!(response.kind, Some(ErrorKind::Validation));

        let response = vault.register("alice", "").await;
        assert_eq!(response.kind, Some(ErrorKind::Validation));

        let response = vault.register("alice", "mk").await;
        assert!(response.success);
        let view = response.data.unwrap();
        assert!(!view.cloud_enabled);
        assert!(view.remote_id.is_none());

        let response = vault.register("alice", "other").await;
        assert_eq!(response.kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_enable_cloud_links_identity() {
        let (vault, transport, _temp) = test_vault().await;
        vault.register("bob", "mk").await;
        let bob_id = login_id(&vault, "bob").await;

        let response = vault.set_cloud_enabled(bob_id, true).await;

        assert!(response.success, "{}", response.message);
        let status = response.data.unwrap();
        assert_eq!(status.routing, Routing::CloudLinked);

        let bob = stored(&vault, "bob").await;
        assert!(bob.cloud_enabled());
        assert_eq!(bob.remote_id(), status.identity.remote_id.as_deref());
        assert!(transport.has_remote_identity(bob.remote_id().unwrap()).await);
    }

    #[tokio::test]
    async fn test_enable_cloud_persistence_failure() {
        let (vault, store, transport, _temp) = failing_vault().await;
        vault.register("bob", "mk").await;
        let bob_id = login_id(&vault, "bob").await;
        store.set_fail_updates(true);

        let response = vault.set_cloud_enabled(bob_id, true).await;

        assert!(!response.success);
        assert_eq!(response.kind, Some(ErrorKind::InconsistentLink));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "inconsistent-link");

        let durable = stored(&vault, "bob").await;
        assert!(!durable.cloud_enabled());
        assert!(durable.remote_id().is_none());

        // The remote identity exists and a retry records it without provisioning again
        assert_eq!(transport.provision_count(), 1);
        store.set_fail_updates(false);
        let response = vault.set_cloud_enabled(bob_id, true).await;
        assert!(response.success, "{}", response.message);
        assert_eq!(transport.provision_count(), 1);

        let durable = stored(&vault, "bob").await;
        assert!(durable.cloud_enabled());
        assert!(transport.has_remote_identity(durable.remote_id().unwrap()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_survives_cloud_timeout() {
        let (vault, transport, _temp) = test_vault().await;
        vault.register("bob", "mk").await;
        let bob_id = login_id(&vault, "bob").await;
        assert!(vault.set_cloud_enabled(bob_id, true).await.success);
        vault.logout().await;
        vault.connections.shutdown().await.unwrap();

        transport.set_connect_delay(Duration::from_secs(60));
        let response = vault.login("bob", "mk").await;

        assert!(response.success);
        let status = response.data.unwrap();
        assert_eq!(status.routing, Routing::LocalOnly);
        assert!(status.warning.is_some());
        assert_eq!(Some(response.message), status.warning);

        let durable = stored(&vault, "bob").await;
        assert!(!durable.cloud_enabled());
        assert!(durable.remote_id().is_some());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (vault, _transport, _temp) = test_vault().await;
        vault.register("alice", "right").await;

        let wrong_key = vault.login("alice", "wrong").await;
        let unknown = vault.login("nobody", "x").await;

        assert_eq!(wrong_key.kind, Some(ErrorKind::AuthFailed));
        assert_eq!(
            serde_json::to_value(&wrong_key).unwrap(),
            serde_json::to_value(&unknown).unwrap()
        );
    }

    #[tokio::test]
    async fn test_reveal_and_edit_need_master_key_each_time() {
        let (vault, _transport, _temp) = test_vault().await;
        vault.register("alice", "mk").await;
        login_id(&vault, "alice").await;

        let id = vault.create_record("github", "octo", "pw1").await.data.unwrap();

        assert!(vault.step_up_verify("alice", "mk").await.success);

        // A successful step-up does not carry over to the next action
        let response = vault.reveal_record(id.as_str(), "wrong").await;
        assert_eq!(response.kind, Some(ErrorKind::AuthFailed));
        assert!(response.data.is_none());

        let patch = RecordPatch {
            secret: Some(SecretString::new("pw2")),
            ..Default::default()
        };
        let response = vault.update_record(id.as_str(), patch.clone(), "wrong").await;
        assert_eq!(response.kind, Some(ErrorKind::AuthFailed));

        assert!(vault.update_record(id.as_str(), patch, "mk").await.success);
        let response = vault.reveal_record(id.as_str(), "mk").await;
        assert_eq!(response.data.unwrap().expose(), "pw2");
    }

    #[tokio::test]
    async fn test_step_up_for_other_user_fails() {
        let (vault, _transport, _temp) = test_vault().await;
        vault.register("alice", "mk").await;
        vault.register("mallory", "mk").await;
        login_id(&vault, "alice").await;

        let response = vault.step_up_verify("mallory", "mk").await;
        assert_eq!(response.kind, Some(ErrorKind::AuthFailed));
    }

    #[tokio::test]
    async fn test_operations_for_foreign_identity_rejected() {
        let (vault, _transport, _temp) = test_vault().await;
        vault.register("alice", "mk").await;
        vault.register("bob", "mk").await;
        login_id(&vault, "alice").await;
        let bob = stored(&vault, "bob").await;

        let response = vault.list_records(bob.id).await;
        assert_eq!(response.kind, Some(ErrorKind::AuthFailed));

        let response = vault.set_cloud_enabled(bob.id, true).await;
        assert_eq!(response.kind, Some(ErrorKind::AuthFailed));
        assert!(!stored(&vault, "bob").await.cloud_enabled());
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let (vault, _transport, _temp) = test_vault().await;
        vault.register("alice", "mk").await;
        let alice_id = login_id(&vault, "alice").await;

        let response = vault.create_record("", "octo", "pw").await;
        assert_eq!(response.kind, Some(ErrorKind::Validation));

        let id = vault.create_record("github", "octo", "pw").await.data.unwrap();
        let records = vault.list_records(alice_id).await.data.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service, "github");

        assert!(vault.delete_record(id.as_str()).await.success);
        let response = vault.delete_record(id.as_str()).await;
        assert_eq!(response.kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_no_session() {
        let (vault, _transport, _temp) = test_vault().await;

        let response = vault.create_record("github", "octo", "pw").await;
        assert_eq!(response.kind, Some(ErrorKind::NoSession));

        let response = vault.list_records(Uuid::new_v4()).await;
        assert_eq!(response.kind, Some(ErrorKind::NoSession));
    }

    #[tokio::test]
    async fn test_delete_account() {
        let (vault, _transport, _temp) = test_vault().await;
        vault.register("alice", "mk").await;
        login_id(&vault, "alice").await;
        vault.create_record("github", "octo", "pw").await;

        let response = vault.delete_account("wrong").await;
        assert_eq!(response.kind, Some(ErrorKind::AuthFailed));

        assert!(vault.delete_account("mk").await.success);
        assert!(vault.identities.get_by_username("alice").await.unwrap().is_none());

        // The name is free again and the new account starts empty
        vault.register("alice", "mk").await;
        let alice_id = login_id(&vault, "alice").await;
        assert!(vault.list_records(alice_id).await.data.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_password() {
        let (vault, _transport, _temp) = test_vault().await;
        let response = vault.generate_password(16);
        assert!(response.success);
        assert_eq!(response.data.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_generate_password_rejects_oversized_length() {
        let (vault, _transport, _temp) = test_vault().await;

        let response = vault.generate_password(usize::MAX);
        assert!(!response.success);
        assert_eq!(response.kind, Some(ErrorKind::Validation));

        let response = vault.generate_password(MAX_PASSWORD_LENGTH);
        assert_eq!(response.data.unwrap().len(), MAX_PASSWORD_LENGTH);
    }

    #[tokio::test]
    async fn test_open_without_remote_uri() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::without_env(temp_dir.path());
        manager.get_mut().hashing = HashParams::fast();
        manager.save().await.unwrap();

        let vault = Vault::open(Some(temp_dir.path().to_path_buf())).await.unwrap();
        assert_eq!(vault.data_dir(), temp_dir.path());
        vault.register("alice", "mk").await;
        let alice_id = login_id(&vault, "alice").await;

        // Without a remote store enabling fails and nothing is recorded
        let response = vault.set_cloud_enabled(alice_id, true).await;
        assert_eq!(response.kind, Some(ErrorKind::ConnectionFailed));
        assert!(!stored(&vault, "alice").await.cloud_enabled());
    }
}

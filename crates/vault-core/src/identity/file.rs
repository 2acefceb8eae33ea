//! JSON-file identity store

use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Identity, IdentityPatch, IdentityStore};
use crate::error::{Result, VaultError};
use crate::storage::JsonFile;

/// Identity store persisted as `identities.json`
pub struct JsonIdentityStore {
    file: JsonFile<IndexMap<Uuid, Identity>>,
}

impl JsonIdentityStore {
    /// Open the store in the given data directory
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let file = JsonFile::open(data_dir.join("identities.json")).await?;
        Ok(Self { file })
    }
}

#[async_trait]
impl IdentityStore for JsonIdentityStore {
    async fn get_by_username(&self, username: &str) -> Result<Option<Identity>> {
        Ok(self
            .file
            .read(|identities| {
                identities
                    .values()
                    .find(|identity| identity.username == username)
                    .cloned()
            })
            .await)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Identity>> {
        Ok(self.file.read(|identities| identities.get(&id).cloned()).await)
    }

    async fn insert(&self, identity: Identity) -> Result<()> {
        let username = identity.username.clone();

        self.file
            .write(|identities| {
                if identities.values().any(|i| i.username == identity.username) {
                    return Err(VaultError::validation("Username already exists"));
                }
                identities.insert(identity.id, identity);
                Ok(())
            })
            .await?;

        info!("Registered identity: {}", username);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: IdentityPatch) -> Result<Identity> {
        let updated = self
            .file
            .write(|identities| {
                let identity = identities
                    .get_mut(&id)
                    .ok_or_else(|| VaultError::NotFound(format!("identity {}", id)))?;
                patch.apply(identity);
                Ok(identity.clone())
            })
            .await?;

        debug!("Updated identity: {}", id);
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.file
            .write(|identities| {
                identities
                    .shift_remove(&id)
                    .map(|_| ())
                    .ok_or_else(|| VaultError::NotFound(format!("identity {}", id)))
            })
            .await?;

        info!("Deleted identity: {}", id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::CloudLink;
    use tempfile::TempDir;

    async fn test_store() -> (JsonIdentityStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonIdentityStore::open(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let (store, _temp) = test_store().await;
        let identity = Identity::new("alice", "hash".to_string());
        let id = identity.id;

        store.insert(identity).await.unwrap();

        let found = store.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(store.get(id).await.unwrap().is_some());
        assert!(store.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (store, _temp) = test_store().await;
        store.insert(Identity::new("alice", "h1".to_string())).await.unwrap();

        let result = store.insert(Identity::new("alice", "h2".to_string())).await;
        assert!(matches!(result, Err(VaultError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_cloud_link() {
        let (store, temp) = test_store().await;
        let identity = Identity::new("bob", "hash".to_string());
        let id = identity.id;
        store.insert(identity).await.unwrap();

        let updated = store
            .update(id, IdentityPatch::cloud(CloudLink::enabled("r1")))
            .await
            .unwrap();
        assert!(updated.cloud_enabled());

        // Survives reopen
        let reopened = JsonIdentityStore::open(temp.path()).await.unwrap();
        let bob = reopened.get(id).await.unwrap().unwrap();
        assert_eq!(bob.remote_id(), Some("r1"));
        assert!(bob.cloud_enabled());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let (store, _temp) = test_store().await;
        let missing = Uuid::new_v4();

        let result = store.update(missing, IdentityPatch::default()).await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));

        let result = store.delete(missing).await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp) = test_store().await;
        let identity = Identity::new("carol", "hash".to_string());
        let id = identity.id;
        store.insert(identity).await.unwrap();

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }
}

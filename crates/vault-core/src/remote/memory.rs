//! In-process document store

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{Document, RemoteProvisioner, RemoteTransport};
use crate::error::{Result, VaultError};

/// Collection holding remote identities
const USERS_COLLECTION: &str = "users";

#[derive(Default)]
struct MemoryState {
    database: Option<String>,
    collections: HashMap<String, IndexMap<String, Document>>,
}

/// Remote store kept in process memory.
///
/// Data survives disconnects. Reachability, connect latency and provisioning
/// failures can be switched at runtime.
pub struct MemoryTransport {
    state: RwLock<MemoryState>,
    reachable: AtomicBool,
    provisioning_fails: AtomicBool,
    connect_delay_ms: AtomicU64,
    connects: AtomicUsize,
    provisions: AtomicUsize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            reachable: AtomicBool::new(true),
            provisioning_fails: AtomicBool::new(false),
            connect_delay_ms: AtomicU64::new(0),
            connects: AtomicUsize::new(0),
            provisions: AtomicUsize::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_provisioning_fails(&self, fails: bool) {
        self.provisioning_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of connect calls received
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of remote identities created
    pub fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    pub async fn connected_database(&self) -> Option<String> {
        self.state.read().await.database.clone()
    }

    /// Whether a remote identity with this id exists
    pub async fn has_remote_identity(&self, remote_id: &str) -> bool {
        self.state
            .read()
            .await
            .collections
            .get(USERS_COLLECTION)
            .is_some_and(|users| users.contains_key(remote_id))
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VaultError::ConnectionFailed("remote store unreachable".to_string()))
        }
    }

    fn ensure_connected(&self, state: &MemoryState) -> Result<()> {
        self.ensure_reachable()?;
        match state.database {
            Some(_) => Ok(()),
            None => Err(VaultError::ConnectionFailed("not connected".to_string())),
        }
    }
}

#[async_trait]
impl RemoteTransport for MemoryTransport {
    async fn connect(&self, database: &str) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.ensure_reachable()?;
        self.state.write().await.database = Some(database.to_string());

        debug!("Memory transport connected to {}", database);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.write().await.database = None;
        Ok(())
    }

    async fn insert(&self, collection: &str, owner: &str, body: Map<String, Value>) -> Result<String> {
        let mut state = self.state.write().await;
        self.ensure_connected(&state)?;

        let id = Uuid::new_v4().simple().to_string();
        let document = Document {
            id: id.clone(),
            owner: owner.to_string(),
            body,
        };

        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document);

        Ok(id)
    }

    async fn find_by_owner(&self, collection: &str, owner: &str) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        self.ensure_connected(&state)?;

        Ok(state
            .collections
            .get(collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|document| document.owner == owner)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        collection: &str,
        owner: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        self.ensure_connected(&state)?;

        let document = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .filter(|document| document.owner == owner);

        match document {
            Some(document) => {
                document.body.extend(fields);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, owner: &str, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        self.ensure_connected(&state)?;

        let Some(documents) = state.collections.get_mut(collection) else {
            return Ok(false);
        };

        if documents.get(id).is_some_and(|document| document.owner == owner) {
            documents.shift_remove(id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl RemoteProvisioner for MemoryTransport {
    async fn create_remote_identity(&self, display_name: &str) -> Result<String> {
        if self.provisioning_fails.load(Ordering::SeqCst) {
            return Err(VaultError::ProvisioningFailed(
                "Error creating user".to_string(),
            ));
        }

        let mut body = Map::new();
        body.insert("username".to_string(), Value::String(display_name.to_string()));

        let id = self
            .insert(USERS_COLLECTION, "", body)
            .await
            .map_err(|e| VaultError::ProvisioningFailed(e.to_string()))?;

        self.provisions.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let transport = MemoryTransport::new();
        let result = transport.find_by_owner("passwords", "r1").await;
        assert!(matches!(result, Err(VaultError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_document_crud_scoped_to_owner() {
        let transport = MemoryTransport::new();
        transport.connect("test").await.unwrap();

        let id = transport
            .insert("passwords", "r1", body(json!({"service": "github"})))
            .await
            .unwrap();

        assert_eq!(transport.find_by_owner("passwords", "r1").await.unwrap().len(), 1);
        assert!(transport.find_by_owner("passwords", "r2").await.unwrap().is_empty());

        let fields = body(json!({"service": "gitlab"}));
        assert!(!transport.update("passwords", "r2", &id, fields.clone()).await.unwrap());
        assert!(transport.update("passwords", "r1", &id, fields).await.unwrap());

        let docs = transport.find_by_owner("passwords", "r1").await.unwrap();
        assert_eq!(docs[0].body["service"], "gitlab");

        assert!(!transport.delete("passwords", "r2", &id).await.unwrap());
        assert!(transport.delete("passwords", "r1", &id).await.unwrap());
        assert!(!transport.delete("passwords", "r1", &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_provisioning() {
        let transport = MemoryTransport::new();
        transport.connect("test").await.unwrap();

        let remote_id = transport.create_remote_identity("bob").await.unwrap();
        assert!(transport.has_remote_identity(&remote_id).await);
        assert_eq!(transport.provision_count(), 1);

        transport.set_provisioning_fails(true);
        let result = transport.create_remote_identity("bob").await;
        assert!(matches!(result, Err(VaultError::ProvisioningFailed(_))));
        assert_eq!(transport.provision_count(), 1);
    }

    #[tokio::test]
    async fn test_data_survives_disconnect() {
        let transport = MemoryTransport::new();
        transport.connect("test").await.unwrap();
        transport
            .insert("passwords", "r1", body(json!({"service": "a"})))
            .await
            .unwrap();

        transport.disconnect().await.unwrap();
        transport.connect("test").await.unwrap();

        assert_eq!(transport.find_by_owner("passwords", "r1").await.unwrap().len(), 1);
    }
}

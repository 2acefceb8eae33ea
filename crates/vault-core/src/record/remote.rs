//! Remote record store over a document transport

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{CredentialRecord, NewRecord, OwnerKey, RecordId, RecordPatch, RecordStore};
use crate::crypto::SecretString;
use crate::error::{Result, VaultError};
use crate::remote::{Document, RemoteTransport};

/// Collection holding remote credential documents
pub const PASSWORDS_COLLECTION: &str = "passwords";

/// Records kept in the remote mirror, owned by remote identity ids.
///
/// Every call is bounded by the request timeout; an elapsed timeout is
/// reported as `ConnectionFailed`.
pub struct RemoteRecordStore {
    transport: Arc<dyn RemoteTransport>,
    request_timeout: Duration,
}

impl RemoteRecordStore {
    pub fn new(transport: Arc<dyn RemoteTransport>, request_timeout: Duration) -> Self {
        Self {
            transport,
            request_timeout,
        }
    }

    async fn bounded<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| {
                VaultError::ConnectionFailed(format!(
                    "{} timed out after {}ms",
                    operation,
                    self.request_timeout.as_millis()
                ))
            })?
    }

    fn to_record(document: Document) -> Option<CredentialRecord> {
        let field = |name: &str| document.body.get(name).and_then(Value::as_str).map(str::to_string);

        let record = CredentialRecord {
            service: field("service")?,
            username: field("username")?,
            secret: SecretString::new(field("password")?),
            updated_at: document
                .body
                .get("updatedAt")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_else(Utc::now),
            id: RecordId::new(document.id),
            owner_id: OwnerKey::new(document.owner),
        };
        Some(record)
    }
}

fn string_field(body: &mut Map<String, Value>, name: &str, value: String) {
    body.insert(name.to_string(), Value::String(value));
}

fn timestamp(body: &mut Map<String, Value>) {
    body.insert("updatedAt".to_string(), serde_json::json!(Utc::now()));
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    async fn create(&self, owner: &OwnerKey, record: NewRecord) -> Result<RecordId> {
        let mut body = Map::new();
        string_field(&mut body, "service", record.service);
        string_field(&mut body, "username", record.username);
        string_field(&mut body, "password", record.secret.expose().to_string());
        timestamp(&mut body);

        let id = self
            .bounded(
                "create",
                self.transport.insert(PASSWORDS_COLLECTION, owner.as_str(), body),
            )
            .await?;

        info!("Created remote record {}", id);
        Ok(RecordId::new(id))
    }

    async fn list_by_owner(&self, owner: &OwnerKey) -> Result<Vec<CredentialRecord>> {
        let documents = self
            .bounded(
                "list",
                self.transport.find_by_owner(PASSWORDS_COLLECTION, owner.as_str()),
            )
            .await?;

        let total = documents.len();
        let records: Vec<CredentialRecord> =
            documents.into_iter().filter_map(Self::to_record).collect();

        if records.len() < total {
            warn!("Skipped {} malformed remote documents", total - records.len());
        }
        Ok(records)
    }

    async fn update(&self, owner: &OwnerKey, id: &RecordId, patch: RecordPatch) -> Result<()> {
        let mut fields = Map::new();
        if let Some(service) = patch.service {
            string_field(&mut fields, "service", service);
        }
        if let Some(username) = patch.username {
            string_field(&mut fields, "username", username);
        }
        if let Some(secret) = patch.secret {
            string_field(&mut fields, "password", secret.expose().to_string());
        }
        timestamp(&mut fields);

        let matched = self
            .bounded(
                "update",
                self.transport
                    .update(PASSWORDS_COLLECTION, owner.as_str(), id.as_str(), fields),
            )
            .await?;

        if !matched {
            return Err(VaultError::NotFound(format!("record {}", id)));
        }

        info!("Updated remote record {}", id);
        Ok(())
    }

    async fn delete(&self, owner: &OwnerKey, id: &RecordId) -> Result<()> {
        let matched = self
            .bounded(
                "delete",
                self.transport
                    .delete(PASSWORDS_COLLECTION, owner.as_str(), id.as_str()),
            )
            .await?;

        if !matched {
            return Err(VaultError::NotFound(format!("record {}", id)));
        }

        info!("Deleted remote record {}", id);
        Ok(())
    }

    async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<usize> {
        let records = self.list_by_owner(owner).await?;
        let mut removed = 0;

        for record in records {
            self.delete(owner, &record.id).await?;
            removed += 1;
        }

        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryTransport;

    async fn test_store() -> (RemoteRecordStore, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        transport.connect("test").await.unwrap();
        let store = RemoteRecordStore::new(transport.clone(), Duration::from_secs(10));
        (store, transport)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (store, _transport) = test_store().await;
        let owner = OwnerKey::new("r1");

        let id = store
            .create(&owner, NewRecord::new("github", "octo", "pw1"))
            .await
            .unwrap();

        let records = store.list_by_owner(&owner).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].owner_id, owner);
        assert_eq!(records[0].secret.expose(), "pw1");
    }

    #[tokio::test]
    async fn test_update_and_delete_not_found() {
        let (store, _transport) = test_store().await;
        let owner = OwnerKey::new("r1");
        let id = store.create(&owner, NewRecord::new("a", "u", "p")).await.unwrap();

        let patch = RecordPatch {
            username: Some("renamed".to_string()),
            ..Default::default()
        };
        let result = store.update(&OwnerKey::new("r2"), &id, patch.clone()).await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));

        store.update(&owner, &id, patch).await.unwrap();
        assert_eq!(store.list_by_owner(&owner).await.unwrap()[0].username, "renamed");

        store.delete(&owner, &id).await.unwrap();
        let result = store.delete(&owner, &id).await;
        assert!(matches!(result, Err(VaultError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unreachable_is_connection_failed() {
        let (store, transport) = test_store().await;
        transport.set_reachable(false);

        let result = store.list_by_owner(&OwnerKey::new("r1")).await;
        assert!(matches!(result, Err(VaultError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_malformed_documents_skipped() {
        let (store, transport) = test_store().await;
        let owner = OwnerKey::new("r1");

        let mut body = Map::new();
        body.insert("service".to_string(), Value::String("only".to_string()));
        transport
            .insert(PASSWORDS_COLLECTION, "r1", body)
            .await
            .unwrap();
        store.create(&owner, NewRecord::new("ok", "u", "p")).await.unwrap();

        let records = store.list_by_owner(&owner).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service, "ok");
    }
}

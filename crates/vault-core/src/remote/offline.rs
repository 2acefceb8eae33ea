//! Transport used when no remote store is configured

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Document, RemoteProvisioner, RemoteTransport};
use crate::error::{Result, VaultError};

/// Every call fails with `ConnectionFailed`, so cloud-enabled logins fall back to local-only
#[derive(Debug, Default)]
pub struct OfflineTransport;

fn unavailable<T>() -> Result<T> {
    Err(VaultError::ConnectionFailed(
        "no remote URI configured".to_string(),
    ))
}

#[async_trait]
impl RemoteTransport for OfflineTransport {
    async fn connect(&self, _database: &str) -> Result<()> {
        unavailable()
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, _collection: &str, _owner: &str, _body: Map<String, Value>) -> Result<String> {
        unavailable()
    }

    async fn find_by_owner(&self, _collection: &str, _owner: &str) -> Result<Vec<Document>> {
        unavailable()
    }

    async fn update(
        &self,
        _collection: &str,
        _owner: &str,
        _id: &str,
        _fields: Map<String, Value>,
    ) -> Result<bool> {
        unavailable()
    }

    async fn delete(&self, _collection: &str, _owner: &str, _id: &str) -> Result<bool> {
        unavailable()
    }

    fn backend_name(&self) -> &'static str {
        "offline"
    }
}

#[async_trait]
impl RemoteProvisioner for OfflineTransport {
    async fn create_remote_identity(&self, _display_name: &str) -> Result<String> {
        Err(VaultError::ProvisioningFailed(
            "no remote URI configured".to_string(),
        ))
    }
}

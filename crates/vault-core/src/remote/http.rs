//! HTTP document-service transport
//!
//! Endpoints, relative to the configured base URI:
//! - `GET  {db}/health` - connectivity check
//! - `POST {db}/collections/{collection}` - insert, answers `{"id": ...}`
//! - `GET  {db}/collections/{collection}?userId=..` - documents of one owner
//! - `PATCH | DELETE {db}/collections/{collection}/{id}?userId=..` - 404 when unmatched
//! - `POST {db}/collections/users` with `{"username": ..}` - provision a remote identity

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use super::{Document, RemoteProvisioner, RemoteTransport};
use crate::error::{Result, VaultError};

const USERS_COLLECTION: &str = "users";

#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: String,
}

/// Remote store reached over HTTP
pub struct HttpTransport {
    client: Client,
    base: Url,
    database: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport for the given base URI
    pub fn new(uri: &str, request_timeout: Duration) -> Result<Self> {
        let base = Url::parse(uri)
            .map_err(|e| VaultError::validation(format!("Invalid remote URI: {}", e)))?;

        if base.cannot_be_a_base() {
            return Err(VaultError::validation(format!(
                "Invalid remote URI: {}",
                uri
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            base,
            database: RwLock::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn connected_database(&self) -> Result<String> {
        self.database
            .read()
            .await
            .clone()
            .ok_or_else(|| VaultError::ConnectionFailed("not connected".to_string()))
    }

    async fn collection_url(&self, collection: &str, id: Option<&str>) -> Result<Url> {
        let database = self.connected_database().await?;
        let mut segments = vec![database.as_str(), "collections", collection];
        if let Some(id) = id {
            segments.push(id);
        }
        Ok(self.endpoint(&segments))
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))
    }

    /// `true` on success, `false` on 404, error otherwise
    fn matched(status: StatusCode) -> Result<bool> {
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(VaultError::ConnectionFailed(format!(
                "remote store answered {}",
                status
            )))
        }
    }

    fn expect_success(response: &reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(VaultError::ConnectionFailed(format!(
                "remote store answered {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn connect(&self, database: &str) -> Result<()> {
        let url = self.endpoint(&[database, "health"]);
        let response = Self::send(self.client.get(url)).await?;
        Self::expect_success(&response)?;

        *self.database.write().await = Some(database.to_string());
        debug!("HTTP transport connected to {}", database);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.database.write().await = None;
        Ok(())
    }

    async fn insert(&self, collection: &str, owner: &str, body: Map<String, Value>) -> Result<String> {
        let url = self.collection_url(collection, None).await?;
        let document = Document {
            id: String::new(),
            owner: owner.to_string(),
            body,
        };

        let mut payload = serde_json::to_value(&document)?;
        if let Some(object) = payload.as_object_mut() {
            object.remove("id");
        }

        let response = Self::send(self.client.post(url).json(&payload)).await?;
        Self::expect_success(&response)?;

        let inserted: InsertResponse = response
            .json()
            .await
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))?;
        Ok(inserted.id)
    }

    async fn find_by_owner(&self, collection: &str, owner: &str) -> Result<Vec<Document>> {
        let url = self.collection_url(collection, None).await?;
        let request = self.client.get(url).query(&[("userId", owner)]);

        let response = Self::send(request).await?;
        Self::expect_success(&response)?;

        response
            .json()
            .await
            .map_err(|e| VaultError::ConnectionFailed(e.to_string()))
    }

    async fn update(
        &self,
        collection: &str,
        owner: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<bool> {
        let url = self.collection_url(collection, Some(id)).await?;
        let request = self
            .client
            .patch(url)
            .query(&[("userId", owner)])
            .json(&fields);

        let response = Self::send(request).await?;
        Self::matched(response.status())
    }

    async fn delete(&self, collection: &str, owner: &str, id: &str) -> Result<bool> {
        let url = self.collection_url(collection, Some(id)).await?;
        let request = self.client.delete(url).query(&[("userId", owner)]);

        let response = Self::send(request).await?;
        Self::matched(response.status())
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl RemoteProvisioner for HttpTransport {
    async fn create_remote_identity(&self, display_name: &str) -> Result<String> {
        let url = self
            .collection_url(USERS_COLLECTION, None)
            .await
            .map_err(|e| VaultError::ProvisioningFailed(e.to_string()))?;

        let request = self
            .client
            .post(url)
            .json(&serde_json::json!({ "username": display_name }));

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::ProvisioningFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VaultError::ProvisioningFailed(format!(
                "remote store answered {}",
                response.status()
            )));
        }

        let created: InsertResponse = response
            .json()
            .await
            .map_err(|e| VaultError::ProvisioningFailed(e.to_string()))?;
        Ok(created.id)
    }
}

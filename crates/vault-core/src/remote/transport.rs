//! Remote collaborator traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A document in a remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    /// Remote identity owning the document
    #[serde(rename = "userId")]
    pub owner: String,

    #[serde(flatten)]
    pub body: Map<String, Value>,
}

/// Connection and document CRUD surface of the remote store.
///
/// Documents are addressed by collection and owner id. Transport faults are
/// reported as `ConnectionFailed`.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Open the connection to a logical database
    async fn connect(&self, database: &str) -> Result<()>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;

    /// Insert a document and return its id
    async fn insert(&self, collection: &str, owner: &str, body: Map<String, Value>) -> Result<String>;

    /// All documents of an owner
    async fn find_by_owner(&self, collection: &str, owner: &str) -> Result<Vec<Document>>;

    /// Merge fields into a document; `false` if no document matched id and owner
    async fn update(
        &self,
        collection: &str,
        owner: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<bool>;

    /// Remove a document; `false` if no document matched id and owner
    async fn delete(&self, collection: &str, owner: &str, id: &str) -> Result<bool>;

    /// Get a human-readable name for this transport
    fn backend_name(&self) -> &'static str;
}

/// Creates remote identities
#[async_trait]
pub trait RemoteProvisioner: Send + Sync {
    /// Create a remote identity and return its id
    async fn create_remote_identity(&self, display_name: &str) -> Result<String>;
}

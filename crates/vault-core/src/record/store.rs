//! Record store trait

use async_trait::async_trait;

use super::{CredentialRecord, NewRecord, OwnerKey, RecordId, RecordPatch};
use crate::error::Result;

/// CRUD over credential records scoped to an owner.
///
/// Stores take the owner key they understand and never translate between
/// local and remote identities.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record and return its id
    async fn create(&self, owner: &OwnerKey, record: NewRecord) -> Result<RecordId>;

    /// List all records belonging to an owner
    async fn list_by_owner(&self, owner: &OwnerKey) -> Result<Vec<CredentialRecord>>;

    /// Update a record; `NotFound` if it is absent or belongs to another owner
    async fn update(&self, owner: &OwnerKey, id: &RecordId, patch: RecordPatch) -> Result<()>;

    /// Delete a record; `NotFound` if it is absent or belongs to another owner
    async fn delete(&self, owner: &OwnerKey, id: &RecordId) -> Result<()>;

    /// Delete every record of an owner, returning how many were removed
    async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<usize>;

    /// Get a human-readable name for this store
    fn backend_name(&self) -> &'static str;
}

//! Identity store trait

use async_trait::async_trait;
use uuid::Uuid;

use super::{Identity, IdentityPatch};
use crate::error::Result;

/// Keyed store of local identities
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up an identity by login name
    async fn get_by_username(&self, username: &str) -> Result<Option<Identity>>;

    /// Look up an identity by id
    async fn get(&self, id: Uuid) -> Result<Option<Identity>>;

    /// Insert a new identity; fails with `Validation` if the username is taken
    async fn insert(&self, identity: Identity) -> Result<()>;

    /// Apply a patch as one write and return the updated identity
    async fn update(&self, id: Uuid, patch: IdentityPatch) -> Result<Identity>;

    /// Remove an identity; fails with `NotFound` if absent
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Get a human-readable name for this store
    fn backend_name(&self) -> &'static str;
}

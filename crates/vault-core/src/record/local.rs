//! Local record store backed by a JSON file

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use super::{CredentialRecord, NewRecord, OwnerKey, RecordId, RecordPatch, RecordStore};
use crate::error::{Result, VaultError};
use crate::storage::JsonFile;

/// Records persisted as `records.json`, listed in insertion order
pub struct LocalRecordStore {
    file: JsonFile<IndexMap<RecordId, CredentialRecord>>,
}

impl LocalRecordStore {
    /// Open the store in the given data directory
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let file = JsonFile::open(data_dir.join("records.json")).await?;
        Ok(Self { file })
    }
}

fn owned_mut<'a>(
    records: &'a mut IndexMap<RecordId, CredentialRecord>,
    owner: &OwnerKey,
    id: &RecordId,
) -> Result<&'a mut CredentialRecord> {
    records
        .get_mut(id)
        .filter(|record| &record.owner_id == owner)
        .ok_or_else(|| VaultError::NotFound(format!("record {}", id)))
}

#[async_trait]
impl RecordStore for LocalRecordStore {
    async fn create(&self, owner: &OwnerKey, record: NewRecord) -> Result<RecordId> {
        let id = RecordId::new(Uuid::new_v4().to_string());
        let stored = CredentialRecord {
            id: id.clone(),
            owner_id: owner.clone(),
            service: record.service,
            username: record.username,
            secret: record.secret,
            updated_at: Utc::now(),
        };

        self.file
            .write(|records| {
                records.insert(id.clone(), stored);
                Ok(())
            })
            .await?;

        info!("Created local record {}", id);
        Ok(id)
    }

    async fn list_by_owner(&self, owner: &OwnerKey) -> Result<Vec<CredentialRecord>> {
        let records = self
            .file
            .read(|records| {
                records
                    .values()
                    .filter(|record| &record.owner_id == owner)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;

        debug!("Listed {} local records", records.len());
        Ok(records)
    }

    async fn update(&self, owner: &OwnerKey, id: &RecordId, patch: RecordPatch) -> Result<()> {
        self.file
            .write(|records| {
                patch.apply(owned_mut(records, owner, id)?);
                Ok(())
            })
            .await?;

        info!("Updated local record {}", id);
        Ok(())
    }

    async fn delete(&self, owner: &OwnerKey, id: &RecordId) -> Result<()> {
        self.file
            .write(|records| {
                owned_mut(records, owner, id)?;
                records.shift_remove(id);
                Ok(())
            })
            .await?;

        info!("Deleted local record {}", id);
        Ok(())
    }

    async fn delete_by_owner(&self, owner: &OwnerKey) -> Result<usize> {
        let removed = self
            .file
            .write(|records| {
                let before = records.len();
                records.retain(|_, record| &record.owner_id != owner);
                Ok(before - records.len())
            })
            .await?;

        info!("Deleted {} local records for owner {}", removed, owner);
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

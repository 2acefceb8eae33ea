//! Versioned JSON document with an in-memory cache

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Result, VaultError};

const FILE_VERSION: u32 = 1;

/// File format for persistent storage
#[derive(Debug, Serialize, Deserialize)]
struct StorageFile<T> {
    version: u32,
    data: T,
}

/// A JSON file mirrored in memory.
///
/// Writers mutate a copy of the cached value; the copy replaces the cache only
/// after it has been written to disk, so a failed save leaves readers seeing
/// the previous state.
pub struct JsonFile<T> {
    path: PathBuf,
    cache: RwLock<T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
{
    /// Open the file, creating its directory if needed. A missing file yields `T::default()`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = Self::load(&path).await?;

        Ok(Self {
            path,
            cache: RwLock::new(data),
        })
    }

    async fn load(path: &Path) -> Result<T> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No existing storage file at {:?}", path);
            return Ok(T::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let file: StorageFile<T> = serde_json::from_str(&contents)?;

        if file.version != FILE_VERSION {
            return Err(VaultError::StorageError(format!(
                "Unsupported storage version {} in {:?}",
                file.version, path
            )));
        }

        debug!("Loaded storage file {:?}", path);
        Ok(file.data)
    }

    /// Read from the cached value
    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let cache = self.cache.read().await;
        f(&cache)
    }

    /// Apply a mutation and persist it. Nothing changes if `f` or the save fails.
    pub async fn write<R>(&self, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let mut cache = self.cache.write().await;

        let mut next = cache.clone();
        let output = f(&mut next)?;

        self.save(&next).await?;
        *cache = next;

        Ok(output)
    }

    async fn save(&self, data: &T) -> Result<()> {
        let file = StorageFile {
            version: FILE_VERSION,
            data,
        };
        let contents = serde_json::to_string_pretty(&file)?;

        // Write atomically using a temp file
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Saved storage file {:?}", self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

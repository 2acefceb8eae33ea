//! Local persistence primitives
//!
//! Identities and local records are kept as versioned JSON documents in the
//! vault data directory.

mod json_file;

pub use json_file::JsonFile;

use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{Result, VaultError};

/// Get the default vault data directory
pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "vault-sync", "vault")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| VaultError::StorageError("Could not determine data directory".to_string()))
}

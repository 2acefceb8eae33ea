//! Application settings management
//!
//! Stores non-sensitive configuration in a plain JSON file next to the
//! identity and record files. Environment variables override the remote
//! section on load.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::crypto::HashParams;
use crate::error::{Result, VaultError};

/// Overrides `remote.uri`
pub const ENV_REMOTE_URI: &str = "VAULT_REMOTE_URI";
/// Overrides `remote.defaultDatabase`
pub const ENV_REMOTE_DB: &str = "VAULT_REMOTE_DB";

const SETTINGS_FILE: &str = "settings.json";

/// Remote document service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSettings {
    /// Base URI of the document service (None = cloud unavailable)
    pub uri: Option<String>,
    /// Database used when the caller names none
    pub default_database: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            uri: None,
            default_database: None,
            connect_timeout_ms: 5000,
            request_timeout_ms: 10000,
        }
    }
}

impl RemoteSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    pub remote: RemoteSettings,
    /// Master-key hashing parameters for new identities
    pub hashing: HashParams,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            remote: RemoteSettings::default(),
            hashing: HashParams::default(),
        }
    }
}

impl Settings {
    /// Apply environment overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup(ENV_REMOTE_URI).filter(|v| !v.is_empty()) {
            debug!("Remote URI overridden from environment");
            self.remote.uri = Some(uri);
        }
        if let Some(database) = lookup(ENV_REMOTE_DB).filter(|v| !v.is_empty()) {
            debug!("Default database overridden from environment: {}", database);
            self.remote.default_database = Some(database);
        }
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Load settings from the data directory, falling back to defaults.
    /// Process environment overrides are applied.
    pub fn new(storage_dir: &Path) -> Self {
        let mut manager = Self::without_env(storage_dir);
        manager
            .settings
            .apply_overrides(|name| std::env::var(name).ok());
        manager
    }

    /// Load settings without consulting the environment
    pub fn without_env(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join(SETTINGS_FILE);
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings file: {}", e);
            Settings::default()
        });

        Self {
            settings_file,
            settings,
        }
    }

    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Replace settings and save
    pub async fn update(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save().await
    }

    /// Reset settings to defaults and delete the settings file
    pub async fn reset(&mut self) -> Result<()> {
        self.settings = Settings::default();

        if self.settings_file.exists() {
            tokio::fs::remove_file(&self.settings_file)
                .await
                .map_err(|e| VaultError::StorageError(e.to_string()))?;
        }

        Ok(())
    }
}

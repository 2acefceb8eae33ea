//! Record type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};

/// Record identifier, assigned by the backing store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner key understood by one store: the local identity id for the local
/// store, the remote identity id for the remote one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored service/username/password triple
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: RecordId,
    pub owner_id: OwnerKey,
    pub service: String,
    pub username: String,
    pub secret: SecretString,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id.clone(),
            service: self.service.clone(),
            username: self.username.clone(),
        }
    }
}

/// Record metadata (safe to display)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: RecordId,
    pub service: String,
    pub username: String,
}

/// Fields of a record to be created
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub service: String,
    pub username: String,
    pub secret: SecretString,
}

impl NewRecord {
    pub fn new(service: &str, username: &str, secret: impl Into<SecretString>) -> Self {
        Self {
            service: service.to_string(),
            username: username.to_string(),
            secret: secret.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(VaultError::validation("Service name not provided"));
        }
        if self.username.trim().is_empty() {
            return Err(VaultError::validation("Username not provided"));
        }
        if self.secret.is_empty() {
            return Err(VaultError::validation("Password not provided"));
        }
        Ok(())
    }
}

/// Partial update of a record
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub service: Option<String>,
    pub username: Option<String>,
    pub secret: Option<SecretString>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.service.is_none() && self.username.is_none() && self.secret.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(VaultError::validation("Password details not provided"));
        }
        if matches!(&self.service, Some(s) if s.trim().is_empty())
            || matches!(&self.username, Some(u) if u.trim().is_empty())
            || matches!(&self.secret, Some(p) if p.is_empty())
        {
            return Err(VaultError::validation("Record fields cannot be empty"));
        }
        Ok(())
    }

    pub fn apply(self, record: &mut CredentialRecord) {
        if let Some(service) = self.service {
            record.service = service;
        }
        if let Some(username) = self.username {
            record.username = username;
        }
        if let Some(secret) = self.secret {
            record.secret = secret;
        }
        record.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_validation() {
        assert!(NewRecord::new("github", "octo", "pw").validate().is_ok());
        assert!(NewRecord::new(" ", "octo", "pw").validate().is_err());
        assert!(NewRecord::new("github", "", "pw").validate().is_err());
        assert!(NewRecord::new("github", "octo", "").validate().is_err());
    }

    #[test]
    fn test_patch_validation() {
        assert!(RecordPatch::default().validate().is_err());

        let patch = RecordPatch {
            secret: Some(SecretString::new("")),
            ..Default::default()
        };
        assert!(patch.validate().is_err());

        let patch = RecordPatch {
            service: Some("gitlab".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_summary_has_no_secret() {
        let record = CredentialRecord {
            id: RecordId::new("1"),
            owner_id: OwnerKey::new("owner"),
            service: "github".to_string(),
            username: "octo".to_string(),
            secret: SecretString::new("hunter2"),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&record.summary()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("github"));
    }
}

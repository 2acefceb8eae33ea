//! Identity type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cloud linkage of an identity.
///
/// `remote_id` and `enabled` always travel together so that an enabled link
/// without a remote identity cannot be constructed, stored or observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCloudLink", rename_all = "camelCase")]
pub struct CloudLink {
    remote_id: Option<String>,
    cloud_enabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCloudLink {
    remote_id: Option<String>,
    #[serde(default)]
    cloud_enabled: bool,
}

impl TryFrom<RawCloudLink> for CloudLink {
    type Error = String;

    fn try_from(raw: RawCloudLink) -> std::result::Result<Self, Self::Error> {
        match (raw.remote_id, raw.cloud_enabled) {
            (None, true) => Err("cloudEnabled is set without a remoteId".to_string()),
            (remote_id, cloud_enabled) => Ok(Self {
                remote_id,
                cloud_enabled,
            }),
        }
    }
}

impl CloudLink {
    /// No remote identity has been provisioned
    pub fn unlinked() -> Self {
        Self::default()
    }

    /// A remote identity exists but the mirror is switched off
    pub fn dormant(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            cloud_enabled: false,
        }
    }

    /// The mirror is switched on for the given remote identity
    pub fn enabled(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            cloud_enabled: true,
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.cloud_enabled
    }

    /// Same link with the mirror switched off; the remote identity is retained
    pub fn disabled(&self) -> Self {
        Self {
            remote_id: self.remote_id.clone(),
            cloud_enabled: false,
        }
    }
}

/// Account record for one user, owned by the local identity store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique identifier
    pub id: Uuid,

    /// Login name (unique, never changes)
    pub username: String,

    /// Argon2id PHC hash of the master key
    pub master_key_hash: String,

    /// Remote identity and mirror switch
    #[serde(flatten)]
    pub cloud: CloudLink,

    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new identity with no cloud linkage
    pub fn new(username: &str, master_key_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            master_key_hash,
            cloud: CloudLink::unlinked(),
            created_at: Utc::now(),
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.cloud.remote_id()
    }

    pub fn cloud_enabled(&self) -> bool {
        self.cloud.is_enabled()
    }
}

/// Partial update of an identity. Only the cloud link is mutable.
#[derive(Debug, Clone, Default)]
pub struct IdentityPatch {
    pub cloud: Option<CloudLink>,
}

impl IdentityPatch {
    pub fn cloud(link: CloudLink) -> Self {
        Self { cloud: Some(link) }
    }

    pub fn apply(self, identity: &mut Identity) {
        if let Some(cloud) = self.cloud {
            identity.cloud = cloud;
        }
    }
}

/// Identity fields safe to hand to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub id: Uuid,
    pub username: String,
    pub remote_id: Option<String>,
    pub cloud_enabled: bool,
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            remote_id: identity.remote_id().map(str::to_string),
            cloud_enabled: identity.cloud_enabled(),
        }
    }
}

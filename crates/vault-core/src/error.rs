//! Error types for vault-core

use serde::Serialize;
use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("{0}")]
    Validation(String),

    /// Deliberately carries no detail about which check failed
    #[error("Authentication failed")]
    AuthFailed,

    #[error("Cloud database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Cloud identity could not be created: {0}")]
    ProvisioningFailed(String),

    #[error("Could not save changes: {0}")]
    PersistenceFailed(String),

    #[error("Cloud identity {remote_id} exists but the link could not be saved: {cause}")]
    InconsistentLink { remote_id: String, cause: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active session")]
    NoSession,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    CryptoError(String),
}

/// Caller-visible failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    AuthFailed,
    ConnectionFailed,
    ProvisioningFailed,
    PersistenceFailed,
    InconsistentLink,
    NotFound,
    NoSession,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::AuthFailed => "auth-failed",
            Self::ConnectionFailed => "connection-failed",
            Self::ProvisioningFailed => "provisioning-failed",
            Self::PersistenceFailed => "persistence-failed",
            Self::InconsistentLink => "inconsistent-link",
            Self::NotFound => "not-found",
            Self::NoSession => "no-session",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AuthFailed => ErrorKind::AuthFailed,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::ProvisioningFailed(_) => ErrorKind::ProvisioningFailed,
            Self::PersistenceFailed(_) => ErrorKind::PersistenceFailed,
            Self::InconsistentLink { .. } => ErrorKind::InconsistentLink,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NoSession => ErrorKind::NoSession,
            Self::StorageError(_)
            | Self::IoError(_)
            | Self::SerializationError(_)
            | Self::CryptoError(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for `VaultError::Validation`
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = VaultError::InconsistentLink {
            remote_id: "r1".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InconsistentLink);
        assert_eq!(err.kind().as_str(), "inconsistent-link");
        assert_eq!(VaultError::AuthFailed.kind(), ErrorKind::AuthFailed);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::ConnectionFailed).unwrap();
        assert_eq!(json, "\"connection-failed\"");
    }

    #[test]
    fn test_auth_failed_message_is_generic() {
        let message = VaultError::AuthFailed.to_string();
        assert_eq!(message, "Authentication failed");
    }
}

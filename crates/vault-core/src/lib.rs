//! # vault-core
//!
//! Core functionality for a password vault with an optional remote mirror:
//! - Argon2id master-key gating with per-action step-up verification
//! - Local JSON record store and a remote document-store mirror
//! - Cloud link coordination that never records a half-applied link
//! - A shared, lazily established remote connection with bounded timeouts

pub mod crypto;
pub mod error;
pub mod gate;
pub mod identity;
pub mod link;
pub mod record;
pub mod remote;
pub mod response;
pub mod session;
pub mod settings;
pub mod storage;
mod vault;

#[cfg(test)]
mod test_support;

pub use crypto::{
    generate_password, HashParams, SecretString, DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH,
};
pub use error::{ErrorKind, Result, VaultError};
pub use gate::{VerificationGate, VerificationResult};
pub use identity::{CloudLink, Identity, IdentityStore, IdentityView, JsonIdentityStore};
pub use link::{CloudLinkCoordinator, CloudToggle, LinkState, Transition};
pub use record::{
    CredentialRecord, LocalRecordStore, NewRecord, OwnerKey, RecordId, RecordPatch, RecordStore,
    RecordSummary, RemoteRecordStore,
};
pub use remote::{ConnectionManager, ConnectionStatus, HttpTransport, MemoryTransport};
pub use response::Response;
pub use session::{RecordRoute, Routing, SessionController, SessionStatus, StepUpGrant};
pub use settings::{RemoteSettings, Settings, SettingsManager};
pub use vault::Vault;

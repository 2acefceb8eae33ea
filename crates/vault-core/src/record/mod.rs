//! Credential records and their two backing stores

mod local;
mod remote;
mod store;
mod types;

pub use local::LocalRecordStore;
pub use remote::{RemoteRecordStore, PASSWORDS_COLLECTION};
pub use store::RecordStore;
pub use types::*;

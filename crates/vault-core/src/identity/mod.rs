//! Local identities and their cloud linkage

mod file;
mod store;
mod types;

pub use file::JsonIdentityStore;
pub use store::IdentityStore;
pub use types::*;

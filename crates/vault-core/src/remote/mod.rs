//! Remote mirror: transport collaborators and the shared connection
//!
//! Three transports are provided:
//! 1. HTTP document service (`HttpTransport`)
//! 2. In-process document store (`MemoryTransport`)
//! 3. A stand-in used when no remote URI is configured (`OfflineTransport`)

mod connection;
mod http;
mod memory;
mod offline;
mod transport;

pub use connection::{ConnectionManager, ConnectionStatus, FALLBACK_DATABASE};
pub use http::HttpTransport;
pub use memory::MemoryTransport;
pub use offline::OfflineTransport;
pub use transport::{Document, RemoteProvisioner, RemoteTransport};

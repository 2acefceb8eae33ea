//! Lazily established, shared connection to the remote store

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::RemoteTransport;
use crate::error::{Result, VaultError};

/// Database used when neither the caller nor the settings name one
pub const FALLBACK_DATABASE: &str = "test";

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome shared by every caller waiting on one connect attempt
type ConnectAttempt = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

enum State {
    Disconnected,
    Connecting {
        attempt: u64,
        database: String,
        future: ConnectAttempt,
    },
    Connected {
        database: String,
    },
}

struct Inner {
    state: State,
    attempts: u64,
}

/// Owns the one connection to the remote store.
///
/// Concurrent first calls join the attempt already in flight instead of
/// opening a second connection. Once connected, further calls succeed
/// immediately whatever database they name; switching databases requires a
/// `shutdown` first.
pub struct ConnectionManager {
    transport: Arc<dyn RemoteTransport>,
    default_database: Option<String>,
    connect_timeout: Duration,
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        default_database: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            default_database,
            connect_timeout,
            inner: Mutex::new(Inner {
                state: State::Disconnected,
                attempts: 0,
            }),
        }
    }

    /// Explicit target, then configured default, then the fallback name
    pub fn resolve_database(&self, target: Option<&str>) -> String {
        target
            .filter(|name| !name.is_empty())
            .or(self.default_database.as_deref().filter(|name| !name.is_empty()))
            .unwrap_or(FALLBACK_DATABASE)
            .to_string()
    }

    /// Connect if not connected yet; no-op success when already connected
    pub async fn ensure_connected(&self, target: Option<&str>) -> Result<()> {
        let (attempt, future) = {
            let mut inner = self.inner.lock().await;

            match &inner.state {
                State::Connected { .. } => return Ok(()),
                State::Connecting {
                    attempt, future, ..
                } => {
                    debug!("Joining in-flight connection attempt {}", attempt);
                    (*attempt, future.clone())
                }
                State::Disconnected => {
                    let database = self.resolve_database(target);
                    inner.attempts += 1;
                    let attempt = inner.attempts;

                    info!("Connecting to remote database: {}", database);
                    let future = self.connect_attempt(database.clone());
                    inner.state = State::Connecting {
                        attempt,
                        database,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        let mut inner = self.inner.lock().await;
        let settled = match &inner.state {
            State::Connecting {
                attempt: current,
                database,
                ..
            } if *current == attempt => Some(database.clone()),
            _ => None,
        };

        if let Some(database) = settled {
            inner.state = match &outcome {
                Ok(()) => {
                    info!("Remote database connected: {}", database);
                    State::Connected { database }
                }
                Err(cause) => {
                    warn!("Remote connection failed: {}", cause);
                    State::Disconnected
                }
            };
        }

        outcome.map_err(VaultError::ConnectionFailed)
    }

    fn connect_attempt(&self, database: String) -> ConnectAttempt {
        let transport = self.transport.clone();
        let timeout = self.connect_timeout;

        async move {
            match tokio::time::timeout(timeout, transport.connect(&database)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => {
                    let _ = transport.disconnect().await;
                    Err(format!("timed out after {}ms", timeout.as_millis()))
                }
            }
        }
        .boxed()
        .shared()
    }

    pub async fn status(&self) -> ConnectionStatus {
        match self.inner.lock().await.state {
            State::Disconnected => ConnectionStatus::Disconnected,
            State::Connecting { .. } => ConnectionStatus::Connecting,
            State::Connected { .. } => ConnectionStatus::Connected,
        }
    }

    /// Database of the live connection, if any
    pub async fn database(&self) -> Option<String> {
        match &self.inner.lock().await.state {
            State::Connected { database } => Some(database.clone()),
            _ => None,
        }
    }

    /// Tear the connection down (process exit)
    pub async fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, State::Disconnected) {
            return Ok(());
        }

        inner.state = State::Disconnected;
        drop(inner);

        self.transport.disconnect().await?;
        info!("Remote connection closed");
        Ok(())
    }
}

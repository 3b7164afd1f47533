use std::fmt;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::error::StoreError;

/// Lifecycle of a supervised datastore connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32 },
}

/// Bounded reconnect schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts made before the store is reported unavailable
    pub max_attempts: u32,
    /// Pause between failed attempts
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// Opens new connections to a datastore
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Clone + Send + Sync;

    async fn connect(&self) -> Result<Self::Connection, StoreError>;
}

/// Hands out a shared connection and re-establishes it after it drops
///
/// Reconnects are serialized: concurrent callers that find the connection gone
/// wait for the single in-flight reconnect instead of starting their own. The
/// lifecycle state is published separately so it stays readable mid-reconnect.
pub struct ConnectionSupervisor<K: Connector> {
    connector: K,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    connection: StdMutex<Option<K::Connection>>,
    reconnect: Mutex<()>,
}

impl<K: Connector> fmt::Debug for ConnectionSupervisor<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("policy", &self.policy)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<K: Connector> ConnectionSupervisor<K> {
    /// Create a supervisor that connects lazily on first use
    pub fn new(connector: K, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            policy,
            state: watch::Sender::new(ConnectionState::Disconnected),
            connection: StdMutex::new(None),
            reconnect: Mutex::new(()),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow lifecycle transitions as they happen
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn current(&self) -> Option<K::Connection> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, connection: Option<K::Connection>) -> Option<K::Connection> {
        std::mem::replace(
            &mut *self.connection.lock().unwrap_or_else(PoisonError::into_inner),
            connection,
        )
    }

    /// Return the live connection, reconnecting first if it was lost
    pub async fn get(&self) -> Result<K::Connection, StoreError> {
        if let Some(connection) = self.current() {
            return Ok(connection);
        }

        let _reconnecting = self.reconnect.lock().await;

        // Another caller may have reconnected while we waited
        if let Some(connection) = self.current() {
            return Ok(connection);
        }

        for attempt in 1..=self.policy.max_attempts {
            self.state
                .send_replace(ConnectionState::Reconnecting { attempt });

            match self.connector.connect().await {
                Ok(connection) => {
                    info!(attempt, "Datastore connection established");
                    self.replace(Some(connection.clone()));
                    self.state.send_replace(ConnectionState::Connected);
                    return Ok(connection);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %e,
                        "Datastore connection attempt failed"
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        Err(StoreError::Unavailable {
            attempts: self.policy.max_attempts,
        })
    }

    /// Drop the current connection after an I/O failure
    pub fn mark_disconnected(&self) {
        // A reconnect already in flight owns the state
        if self.replace(None).is_some() {
            warn!("Datastore connection lost");
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

//! Per-entry connection registry.
//!
//! The application owns one [`ConnectionRegistry`] and hands references to
//! whatever needs a specific controller. Entries are keyed by an opaque
//! entry id, typically the controller's configured name.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionConfig};
use crate::transport::{Connector, Endpoint, TcpConnector};

/// Errors produced by the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An entry with this id is already set up.
    #[error("entry '{0}' is already registered")]
    Duplicate(String),
    /// No entry with this id exists.
    #[error("entry '{0}' not found")]
    NotFound(String),
}

/// Owns one [`Connection`] per configured controller.
pub struct ConnectionRegistry<C: Connector + Clone = TcpConnector> {
    connector: C,
    config: ConnectionConfig,
    entries: RwLock<HashMap<String, Connection<C>>>,
}

impl ConnectionRegistry<TcpConnector> {
    /// Create an empty registry using TCP with default socket options.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(TcpConnector::default(), config)
    }
}

impl<C: Connector + Clone> ConnectionRegistry<C> {
    /// Create an empty registry whose connections open via `connector`.
    pub fn with_connector(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a connection for `entry_id`, connect it eagerly and store it.
    ///
    /// A failed initial connect is not an error: the connection keeps
    /// retrying in the background.
    pub async fn setup(
        &self,
        entry_id: impl Into<String>,
        endpoint: Endpoint,
    ) -> Result<Connection<C>, RegistryError> {
        let entry_id = entry_id.into();
        let connection = {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&entry_id) {
                return Err(RegistryError::Duplicate(entry_id));
            }
            let connection =
                Connection::with_connector(endpoint, self.connector.clone(), self.config.clone());
            entries.insert(entry_id.clone(), connection.clone());
            connection
        };
        tracing::info!("Set up entry '{entry_id}' for {}", connection.endpoint());
        connection.connect().await;
        Ok(connection)
    }

    /// Look up the connection for `entry_id`.
    pub async fn get(&self, entry_id: &str) -> Option<Connection<C>> {
        self.entries.read().await.get(entry_id).cloned()
    }

    /// Ids of all registered entries, sorted.
    pub async fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove `entry_id` and close its connection.
    pub async fn unload(&self, entry_id: &str) -> Result<(), RegistryError> {
        let connection = self
            .entries
            .write()
            .await
            .remove(entry_id)
            .ok_or_else(|| RegistryError::NotFound(entry_id.to_string()))?;
        connection.close().await;
        tracing::info!("Unloaded entry '{entry_id}'");
        Ok(())
    }

    /// Remove and close every entry.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.entries.write().await.drain().collect();
        for (entry_id, connection) in drained {
            connection.close().await;
            tracing::debug!("Closed entry '{entry_id}'");
        }
    }

    /// Number of registered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

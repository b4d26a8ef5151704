//! High-level client API.

use crate::cache::{parse_names, Cache};
use crate::connection::{Connection, ConnectionConfig};
use crate::cursor::ScanCursor;
use crate::error::ClientError;
use ignite_protocol::hash;
use ignite_protocol::{BinaryWriter, OpCode, ProtocolVersion, StatusCode, Value};
use std::sync::Arc;

/// High-level client for an Ignite node.
///
/// Every `cache_*` method is a thin wrapper over a [`Cache`] handle without
/// type hints; use [`Client::cache`] to set hints or the keep-binary flag.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Creates a client and connects it.
    pub async fn open(config: ConnectionConfig) -> Result<Self, ClientError> {
        let client = Self::new(config);
        client.connect().await?;
        Ok(client)
    }

    /// Connects to the node, replacing any previous session.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.conn.protocol_version()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying session.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Returns a handle to the named cache.
    pub fn cache(&self, name: impl Into<String>) -> Cache {
        Cache::new(self.conn.clone(), name)
    }

    // =========================================================================
    // Cache lifecycle
    // =========================================================================

    /// Lists the names of all caches on the node.
    pub async fn cache_get_names(&self) -> Result<Vec<String>, ClientError> {
        self.conn
            .execute_with(OpCode::CacheGetNames, &[], parse_names)
            .await
    }

    /// Creates a cache, returning `false` if one with that name already exists.
    pub async fn cache_create_with_name(&self, name: &str) -> Result<bool, ClientError> {
        let mut w = BinaryWriter::with_capacity(name.len() + 5);
        w.write_string(name)?;
        match self.conn.execute(OpCode::CacheCreateWithName, w.as_bytes()).await {
            Ok(_) => Ok(true),
            Err(ClientError::Operation {
                status: StatusCode::CacheExists,
                message,
            }) => {
                tracing::debug!("Cache {} already exists: {}", name, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn cache_destroy(&self, name: &str) -> Result<(), ClientError> {
        self.conn
            .execute(OpCode::CacheDestroy, &hash::cache_id(name).to_le_bytes())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Cache entries
    // =========================================================================

    pub async fn cache_get(&self, cache: &str, key: impl Into<Value>) -> Result<Option<Value>, ClientError> {
        self.cache(cache).get(key).await
    }

    pub async fn cache_put(
        &self,
        cache: &str,
        key: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<(), ClientError> {
        self.cache(cache).put(key, value).await
    }

    pub async fn cache_get_all(
        &self,
        cache: &str,
        keys: &[Value],
    ) -> Result<Vec<(Value, Value)>, ClientError> {
        self.cache(cache).get_all(keys).await
    }

    pub async fn cache_put_all(&self, cache: &str, entries: &[(Value, Value)]) -> Result<(), ClientError> {
        self.cache(cache).put_all(entries).await
    }

    pub async fn cache_contains_key(&self, cache: &str, key: impl Into<Value>) -> Result<bool, ClientError> {
        self.cache(cache).contains_key(key).await
    }

    pub async fn cache_contains_keys(&self, cache: &str, keys: &[Value]) -> Result<bool, ClientError> {
        self.cache(cache).contains_keys(keys).await
    }

    pub async fn cache_clear(&self, cache: &str) -> Result<(), ClientError> {
        self.cache(cache).clear().await
    }

    pub async fn cache_clear_key(&self, cache: &str, key: impl Into<Value>) -> Result<(), ClientError> {
        self.cache(cache).clear_key(key).await
    }

    pub async fn cache_remove_key(&self, cache: &str, key: impl Into<Value>) -> Result<bool, ClientError> {
        self.cache(cache).remove_key(key).await
    }

    pub async fn cache_remove_keys(&self, cache: &str, keys: &[Value]) -> Result<(), ClientError> {
        self.cache(cache).remove_keys(keys).await
    }

    pub async fn cache_remove_all(&self, cache: &str) -> Result<(), ClientError> {
        self.cache(cache).remove_all().await
    }

    pub async fn cache_get_size(&self, cache: &str) -> Result<i64, ClientError> {
        self.cache(cache).size().await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Opens a scan query cursor over `cache`.
    pub async fn scan_query(&self, cache: &str, page_size: i32) -> Result<ScanCursor, ClientError> {
        self.cache(cache).scan(page_size).await
    }
}

//! Connection session.
//!
//! A session owns one socket and carries at most one request at a time. A
//! second caller arriving while a request is in flight fails fast with
//! [`ClientError::SessionBusy`] instead of queueing.

use crate::error::ClientError;
use crate::handshake::{HandshakeNegotiator, HandshakeOutcome};
use bytes::{Bytes, BytesMut};
use ignite_protocol::frame::build_request;
use ignite_protocol::{
    FrameDecoder, HandshakeResponse, OpCode, ProtocolVersion, ResponseFrame, DEFAULT_PORT,
};
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Applies to each request/response exchange, handshake included.
    pub request_timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Version proposed first; the node may talk it down once.
    pub protocol_version: ProtocolVersion,
    pub read_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            username: None,
            password: None,
            protocol_version: ProtocolVersion::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// `host:port` form used for connecting and in log lines.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Socket and read buffer of an established session.
struct SessionIo {
    stream: TcpStream,
    decoder: FrameDecoder,
}

/// A session with one Ignite node.
pub struct Connection {
    config: ConnectionConfig,
    io: Mutex<Option<SessionIo>>,
    /// Next request id. Starts at 1 and never goes back.
    next_id: AtomicI64,
    /// Id of the request on the wire, 0 when idle.
    in_flight: AtomicI64,
    connected: AtomicBool,
    /// Bumped whenever the socket changes; cursors remember the epoch they were opened in.
    epoch: AtomicU64,
    version: SyncMutex<Option<ProtocolVersion>>,
    /// Cursor ids dropped while still open on the node, released before the next request.
    pending_release: SyncMutex<Vec<(u64, i64)>>,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            io: Mutex::new(None),
            next_id: AtomicI64::new(1),
            in_flight: AtomicI64::new(0),
            connected: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            version: SyncMutex::new(None),
            pending_release: SyncMutex::new(Vec::new()),
        }
    }

    /// Creates a connection and performs the handshake.
    pub async fn open(config: ConnectionConfig) -> Result<Self, ClientError> {
        let conn = Self::new(config);
        conn.connect().await?;
        Ok(conn)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects and negotiates the protocol version, replacing any previous socket.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut negotiator = HandshakeNegotiator::new(
            self.config.protocol_version,
            self.config.username.clone(),
            self.config.password.clone(),
        )?;

        let mut guard = self.io.lock().await;
        if guard.take().is_some() {
            self.mark_disconnected();
        }

        loop {
            let mut io = self.dial().await?;

            tracing::debug!("Starting handshake at protocol {}", negotiator.version());
            let request = negotiator.request().encode()?;
            let body = tokio::time::timeout(
                self.config.request_timeout,
                exchange(&mut io, &request, self.config.read_buffer_size),
            )
            .await
            .map_err(|_| {
                tracing::debug!("Handshake timed out");
                ClientError::Timeout
            })??;

            match negotiator.on_response(HandshakeResponse::parse(&body)?)? {
                HandshakeOutcome::Ready(version) => {
                    tracing::debug!("Handshake complete, protocol {}", version);
                    *guard = Some(io);
                    *self.version.lock() = Some(version);
                    self.epoch.fetch_add(1, Ordering::SeqCst);
                    self.connected.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                HandshakeOutcome::Retry(version) => {
                    tracing::debug!("Reconnecting to retry handshake at {}", version);
                    let _ = io.stream.shutdown().await;
                }
            }
        }
    }

    async fn dial(&self) -> Result<SessionIo, ClientError> {
        let addr = self.config.addr();
        tracing::debug!("Connecting to {}...", addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection to {} failed: {}", addr, e);
            ClientError::Connection(e)
        })?;

        stream.set_nodelay(true).ok();
        tracing::debug!("TCP connected to {}", addr);

        Ok(SessionIo {
            stream,
            decoder: FrameDecoder::with_capacity(self.config.read_buffer_size),
        })
    }

    /// Sends one request and returns the raw response payload.
    pub async fn execute(&self, op: OpCode, payload: &[u8]) -> Result<Bytes, ClientError> {
        self.execute_with(op, payload, Ok).await
    }

    /// Sends one request and parses the response payload while still holding
    /// the session.
    ///
    /// Any fatal error, parse failures included, tears the session down.
    pub async fn execute_with<T, F>(
        &self,
        op: OpCode,
        payload: &[u8],
        parse: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce(Bytes) -> Result<T, ClientError>,
    {
        let mut guard = self.io.try_lock().map_err(|_| ClientError::SessionBusy {
            in_flight: self.in_flight.load(Ordering::SeqCst),
        })?;

        let result = self.execute_locked(&mut guard, op, payload, parse).await;
        if let Err(err) = &result {
            if err.is_fatal() {
                self.teardown(&mut guard, err);
            }
        }
        result
    }

    async fn execute_locked<T, F>(
        &self,
        guard: &mut MutexGuard<'_, Option<SessionIo>>,
        op: OpCode,
        payload: &[u8],
        parse: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce(Bytes) -> Result<T, ClientError>,
    {
        let io = guard.as_mut().ok_or(ClientError::NotConnected)?;
        self.release_dropped_cursors(io).await?;

        let response = self.round_trip(io, op, payload).await?;
        if !response.is_success() {
            let message = response.error_message()?;
            tracing::debug!("{} failed: {} {}", op, response.header.status, message);
            return Err(ClientError::Operation {
                status: response.header.status,
                message,
            });
        }
        parse(response.payload)
    }

    async fn round_trip(
        &self,
        io: &mut SessionIo,
        op: OpCode,
        payload: &[u8],
    ) -> Result<ResponseFrame, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = build_request(op, id, payload)?;
        tracing::debug!("Sending {} id={} ({} bytes)", op, id, frame.len());

        self.in_flight.store(id, Ordering::SeqCst);
        let body = tokio::time::timeout(
            self.config.request_timeout,
            exchange(io, &frame, self.config.read_buffer_size),
        )
        .await;
        self.in_flight.store(0, Ordering::SeqCst);

        let body = body.map_err(|_| {
            tracing::debug!("Request id={} timed out", id);
            ClientError::Timeout
        })??;

        let response = ResponseFrame::parse(body)?;
        if response.header.request_id != id {
            return Err(ClientError::Desync {
                expected: id,
                actual: response.header.request_id,
            });
        }
        tracing::debug!("Request id={} got {}", id, response.header.status);
        Ok(response)
    }

    /// Closes node-side cursors that were dropped before exhaustion.
    ///
    /// Failures reported by the node are logged and swallowed; I/O failures
    /// propagate.
    async fn release_dropped_cursors(&self, io: &mut SessionIo) -> Result<(), ClientError> {
        let epoch = self.epoch();
        let pending: Vec<i64> = {
            let mut queue = self.pending_release.lock();
            std::mem::take(&mut *queue)
                .into_iter()
                .filter(|(e, _)| *e == epoch)
                .map(|(_, id)| id)
                .collect()
        };

        for cursor_id in pending {
            let response = self
                .round_trip(io, OpCode::ResourceClose, &cursor_id.to_le_bytes())
                .await?;
            if !response.is_success() {
                tracing::warn!(
                    "Failed to close cursor {}: {} {}",
                    cursor_id,
                    response.header.status,
                    response.error_message().unwrap_or_default()
                );
            }
        }
        Ok(())
    }

    /// Queues a cursor for release before the next request in the same epoch.
    pub(crate) fn defer_release(&self, epoch: u64, cursor_id: i64) {
        if epoch == self.epoch() && self.is_connected() {
            self.pending_release.lock().push((epoch, cursor_id));
        }
    }

    fn teardown(&self, guard: &mut MutexGuard<'_, Option<SessionIo>>, cause: &ClientError) {
        tracing::warn!("Tearing down session to {}: {}", self.config.addr(), cause);
        guard.take();
        self.mark_disconnected();
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.version.lock() = None;
        self.pending_release.lock().clear();
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Protocol version agreed during the handshake.
    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        *self.version.lock()
    }

    /// Current session epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Id of the request currently on the wire, if any.
    pub fn in_flight(&self) -> Option<i64> {
        match self.in_flight.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    /// Closes the connection. Closing an already closed connection is a no-op.
    pub async fn close(&self) -> Result<(), ClientError> {
        let mut guard = self.io.lock().await;
        if let Some(mut io) = guard.take() {
            tracing::debug!("Closing connection to {}", self.config.addr());
            if let Err(e) = self.release_dropped_cursors(&mut io).await {
                tracing::warn!("Failed to release cursors on close: {}", e);
            }
            let _ = io.stream.shutdown().await;
            self.mark_disconnected();
        }
        Ok(())
    }
}

/// Writes one frame and reads back one length-prefixed frame body.
async fn exchange(io: &mut SessionIo, frame: &[u8], read_chunk: usize) -> Result<Bytes, ClientError> {
    io.stream.write_all(frame).await?;

    loop {
        if let Some(body) = io.decoder.decode_frame()? {
            return Ok(body);
        }

        let buf: &mut BytesMut = io.decoder.buffer_mut();
        buf.reserve(read_chunk);
        let n = io.stream.read_buf(buf).await?;
        if n == 0 {
            tracing::debug!("Connection closed by node");
            return Err(ClientError::ConnectionClosed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 10800);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.protocol_version, ProtocolVersion::V1_1_0);
        assert_eq!(config.addr(), "127.0.0.1:10800");
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config = ConnectionConfig::default().with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::default().with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_new_connection_is_idle() {
        let conn = Connection::new(ConnectionConfig::default());
        assert!(!conn.is_connected());
        assert_eq!(conn.in_flight(), None);
        assert_eq!(conn.protocol_version(), None);
        assert_eq!(conn.epoch(), 0);
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let conn = Connection::new(ConnectionConfig::default());
        let err = conn.execute(OpCode::CacheGetNames, &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        // Not connected is not a protocol failure; nothing to tear down.
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = Connection::new(ConnectionConfig::default());
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.is_connected());
    }
}

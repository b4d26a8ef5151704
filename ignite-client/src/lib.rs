//! # ignite-client
//!
//! Async thin client for Apache Ignite.
//!
//! This crate provides:
//! - A single-socket session with handshake and protocol version fallback
//! - Typed cache operations (get, put, bulk, contains, remove, clear, size)
//! - Cache lifecycle (list, create, destroy)
//! - Paged scan query cursors
//! - A pool running operation batches in parallel over several sessions

pub mod cache;
pub mod client;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod handshake;
pub mod pool;

pub use cache::Cache;
pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use cursor::{CursorState, ScanCursor};
pub use error::ClientError;
pub use handshake::{HandshakeNegotiator, HandshakeOutcome, HandshakeState};
pub use pool::{BatchResults, ClientPool, OperationResult, PoolOperation, PoolOutput};

pub use ignite_protocol::{ProtocolVersion, TypeHint, TypeHints, Value};

//! # ignite-protocol
//!
//! Apache Ignite binary client protocol, without any I/O.
//!
//! This crate provides:
//! - The binary type codec (primitives, arrays, collections, maps, complex objects)
//! - Java-compatible hashing for cache ids, type ids, field ids and object hash codes
//! - Request/response framing and a buffering frame decoder
//! - Handshake messages, operation codes and server status codes

pub mod codec;
pub mod error;
pub mod frame;
pub mod hash;
pub mod message;
pub mod object;
pub mod types;
pub mod value;

pub use codec::{apply_hint, decode, encode, encode_hinted, BinaryReader, BinaryWriter};
pub use error::{ProtocolError, StatusCode};
pub use frame::{build_request, FrameDecoder, ResponseFrame, ResponseHeader};
pub use message::{HandshakeRequest, HandshakeResponse, OpCode, ProtocolVersion};
pub use object::{ComplexObjectSchema, SchemaField};
pub use types::{CollectionKind, MapKind, TypeCode, TypeHint, TypeHints};
pub use value::{ComplexObject, Value};

/// Default thin client port of an Ignite node.
pub const DEFAULT_PORT: u16 = 10800;

/// Maximum accepted frame body size (64 MiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Maximum nesting depth of containers accepted by the decoder.
pub const MAX_NESTING_DEPTH: usize = 64;

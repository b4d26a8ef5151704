//! Protocol error types and server status codes.

use std::fmt;
use thiserror::Error;

/// Errors raised while encoding values or decoding bytes received from a node.
///
/// Decode errors always carry the absolute byte position at which the input
/// stopped making sense.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown type code {code} at position {position}")]
    UnknownTypeCode { code: u8, position: usize },

    #[error("expected type code {expected}, found {found} at position {position}")]
    UnexpectedTypeCode {
        expected: u8,
        found: u8,
        position: usize,
    },

    #[error("truncated input at position {position}: need {needed} bytes, have {available}")]
    Truncated {
        needed: usize,
        available: usize,
        position: usize,
    },

    #[error("invalid length {length} at position {position}")]
    InvalidLength { length: i64, position: usize },

    #[error("invalid UTF-8 in string at position {position}")]
    InvalidUtf8 { position: usize },

    #[error("invalid char code unit {unit:#06x} at position {position}")]
    InvalidChar { unit: u16, position: usize },

    #[error("invalid collection kind {kind} at position {position}")]
    InvalidCollectionKind { kind: i8, position: usize },

    #[error("invalid map kind {kind} at position {position}")]
    InvalidMapKind { kind: i8, position: usize },

    #[error("timestamp {millis}ms out of range at position {position}")]
    InvalidTimestamp { millis: i64, position: usize },

    #[error("unsupported binary object version {version} at position {position}")]
    UnsupportedObjectVersion { version: u8, position: usize },

    #[error("malformed binary object at position {position}: {reason}")]
    MalformedObject {
        reason: &'static str,
        position: usize,
    },

    #[error("nesting deeper than {max} levels at position {position}")]
    NestingTooDeep { max: usize, position: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("request too large: {size} bytes (max {max})")]
    RequestTooLarge { size: usize, max: usize },

    #[error("unsupported value kind: {0}")]
    UnsupportedValueKind(&'static str),

    #[error("value {value} does not fit {hint}")]
    ValueOutOfRange { hint: String, value: String },

    #[error("type hint {hint} cannot be applied to a {kind} value")]
    HintMismatch { hint: String, kind: &'static str },

    #[error("invalid type hint: {0}")]
    InvalidTypeHint(String),

    #[error("invalid protocol version: {0}")]
    InvalidVersion(String),
}

impl ProtocolError {
    /// Returns whether this error was raised on the encode path.
    ///
    /// Encode errors happen before anything is written to the socket, so the
    /// session that produced them stays usable.
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnsupportedValueKind(_)
                | ProtocolError::ValueOutOfRange { .. }
                | ProtocolError::HintMismatch { .. }
                | ProtocolError::RequestTooLarge { .. }
                | ProtocolError::InvalidTypeHint(_)
                | ProtocolError::InvalidVersion(_)
        )
    }

    /// Returns the byte position of a decode error, if it has one.
    pub fn position(&self) -> Option<usize> {
        match self {
            ProtocolError::UnknownTypeCode { position, .. }
            | ProtocolError::UnexpectedTypeCode { position, .. }
            | ProtocolError::Truncated { position, .. }
            | ProtocolError::InvalidLength { position, .. }
            | ProtocolError::InvalidUtf8 { position }
            | ProtocolError::InvalidChar { position, .. }
            | ProtocolError::InvalidCollectionKind { position, .. }
            | ProtocolError::InvalidMapKind { position, .. }
            | ProtocolError::InvalidTimestamp { position, .. }
            | ProtocolError::UnsupportedObjectVersion { position, .. }
            | ProtocolError::MalformedObject { position, .. }
            | ProtocolError::NestingTooDeep { position, .. } => Some(*position),
            _ => None,
        }
    }
}

/// Status codes returned by the node in the response header.
///
/// Zero means success; everything else is accompanied by an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    Failed,
    InvalidOpCode,
    CacheDoesNotExist,
    CacheExists,
    TooManyCursors,
    ResourceDoesNotExist,
    SecurityViolation,
    AuthFailed,
    Other(i32),
}

impl StatusCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => StatusCode::Success,
            1 => StatusCode::Failed,
            2 => StatusCode::InvalidOpCode,
            1000 => StatusCode::CacheDoesNotExist,
            1001 => StatusCode::CacheExists,
            1010 => StatusCode::TooManyCursors,
            1011 => StatusCode::ResourceDoesNotExist,
            1012 => StatusCode::SecurityViolation,
            2000 => StatusCode::AuthFailed,
            other => StatusCode::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            StatusCode::Success => 0,
            StatusCode::Failed => 1,
            StatusCode::InvalidOpCode => 2,
            StatusCode::CacheDoesNotExist => 1000,
            StatusCode::CacheExists => 1001,
            StatusCode::TooManyCursors => 1010,
            StatusCode::ResourceDoesNotExist => 1011,
            StatusCode::SecurityViolation => 1012,
            StatusCode::AuthFailed => 2000,
            StatusCode::Other(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Success)
    }

    /// Returns whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StatusCode::TooManyCursors | StatusCode::Failed)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Success => "SUCCESS",
            StatusCode::Failed => "FAILED",
            StatusCode::InvalidOpCode => "INVALID_OP_CODE",
            StatusCode::CacheDoesNotExist => "CACHE_DOES_NOT_EXIST",
            StatusCode::CacheExists => "CACHE_EXISTS",
            StatusCode::TooManyCursors => "TOO_MANY_CURSORS",
            StatusCode::ResourceDoesNotExist => "RESOURCE_DOES_NOT_EXIST",
            StatusCode::SecurityViolation => "SECURITY_VIOLATION",
            StatusCode::AuthFailed => "AUTH_FAILED",
            StatusCode::Other(_) => "UNKNOWN",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

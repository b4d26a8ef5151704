//! Client error types.

use ignite_protocol::{ProtocolError, ProtocolVersion, StatusCode};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("handshake rejected: {message}")]
    Handshake {
        message: String,
        server_version: Option<ProtocolVersion>,
    },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("encode error: {0}")]
    Encode(ProtocolError),

    #[error("decode error: {0}")]
    Decode(ProtocolError),

    #[error("response id {actual} does not match request id {expected}")]
    Desync { expected: i64, actual: i64 },

    #[error("operation failed: {status} - {message}")]
    Operation { status: StatusCode, message: String },

    #[error("session busy: request {in_flight} still in flight")]
    SessionBusy { in_flight: i64 },

    #[error("cursor closed")]
    CursorClosed,

    #[error("not connected")]
    NotConnected,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("pool worker failed: {0}")]
    Worker(String),
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        if err.is_encode_error() {
            ClientError::Encode(err)
        } else {
            ClientError::Decode(err)
        }
    }
}

impl ClientError {
    /// Returns whether the session that produced this error is no longer usable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_)
                | ClientError::ConnectionClosed
                | ClientError::Timeout
                | ClientError::Handshake { .. }
                | ClientError::Authentication(_)
                | ClientError::Decode(_)
                | ClientError::Desync { .. }
        )
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connection(_) | ClientError::ConnectionClosed | ClientError::Timeout => true,
            ClientError::SessionBusy { .. } => true,
            ClientError::Operation { status, .. } => status.is_retryable(),
            _ => false,
        }
    }

    /// Server status of a failed operation.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ClientError::Operation { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_split() {
        let encode: ClientError = ProtocolError::UnsupportedValueKind("set").into();
        assert!(matches!(encode, ClientError::Encode(_)));
        assert!(!encode.is_fatal());

        let decode: ClientError = ProtocolError::UnknownTypeCode {
            code: 77,
            position: 12,
        }
        .into();
        assert!(matches!(decode, ClientError::Decode(_)));
        assert!(decode.is_fatal());
    }

    #[test]
    fn test_operation_error() {
        let err = ClientError::Operation {
            status: StatusCode::CacheDoesNotExist,
            message: "Cache does not exist".into(),
        };
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), Some(StatusCode::CacheDoesNotExist));
        assert_eq!(
            err.to_string(),
            "operation failed: CACHE_DOES_NOT_EXIST (1000) - Cache does not exist"
        );
    }

    #[test]
    fn test_fatality() {
        assert!(ClientError::Timeout.is_fatal());
        assert!(ClientError::Desync {
            expected: 1,
            actual: 2
        }
        .is_fatal());
        assert!(!ClientError::SessionBusy { in_flight: 4 }.is_fatal());
        assert!(ClientError::SessionBusy { in_flight: 4 }.is_retryable());
        assert!(!ClientError::CursorClosed.is_fatal());
        assert_eq!(ClientError::NotConnected.status_code(), None);
    }
}

//! Operation codes, protocol versions and handshake messages.

use crate::codec::{BinaryReader, BinaryWriter};
use crate::error::{ProtocolError, StatusCode};
use crate::MAX_FRAME_SIZE;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Request operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum OpCode {
    ResourceClose = 0,
    CacheGet = 1000,
    CachePut = 1001,
    CacheGetAll = 1003,
    CachePutAll = 1004,
    CacheContainsKey = 1011,
    CacheContainsKeys = 1012,
    CacheClear = 1013,
    CacheClearKey = 1014,
    CacheRemoveKey = 1016,
    CacheRemoveKeys = 1018,
    CacheRemoveAll = 1019,
    CacheGetSize = 1020,
    CacheGetNames = 1050,
    CacheCreateWithName = 1051,
    CacheDestroy = 1056,
    QueryScan = 2000,
    QueryScanCursorGetPage = 2001,
}

impl OpCode {
    pub fn code(self) -> i16 {
        self as i16
    }

    pub fn from_code(code: i16) -> Option<Self> {
        let op = match code {
            0 => OpCode::ResourceClose,
            1000 => OpCode::CacheGet,
            1001 => OpCode::CachePut,
            1003 => OpCode::CacheGetAll,
            1004 => OpCode::CachePutAll,
            1011 => OpCode::CacheContainsKey,
            1012 => OpCode::CacheContainsKeys,
            1013 => OpCode::CacheClear,
            1014 => OpCode::CacheClearKey,
            1016 => OpCode::CacheRemoveKey,
            1018 => OpCode::CacheRemoveKeys,
            1019 => OpCode::CacheRemoveAll,
            1020 => OpCode::CacheGetSize,
            1050 => OpCode::CacheGetNames,
            1051 => OpCode::CacheCreateWithName,
            1056 => OpCode::CacheDestroy,
            2000 => OpCode::QueryScan,
            2001 => OpCode::QueryScanCursorGetPage,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(self) -> &'static str {
        match self {
            OpCode::ResourceClose => "OP_RESOURCE_CLOSE",
            OpCode::CacheGet => "OP_CACHE_GET",
            OpCode::CachePut => "OP_CACHE_PUT",
            OpCode::CacheGetAll => "OP_CACHE_GET_ALL",
            OpCode::CachePutAll => "OP_CACHE_PUT_ALL",
            OpCode::CacheContainsKey => "OP_CACHE_CONTAINS_KEY",
            OpCode::CacheContainsKeys => "OP_CACHE_CONTAINS_KEYS",
            OpCode::CacheClear => "OP_CACHE_CLEAR",
            OpCode::CacheClearKey => "OP_CACHE_CLEAR_KEY",
            OpCode::CacheRemoveKey => "OP_CACHE_REMOVE_KEY",
            OpCode::CacheRemoveKeys => "OP_CACHE_REMOVE_KEYS",
            OpCode::CacheRemoveAll => "OP_CACHE_REMOVE_ALL",
            OpCode::CacheGetSize => "OP_CACHE_GET_SIZE",
            OpCode::CacheGetNames => "OP_CACHE_GET_NAMES",
            OpCode::CacheCreateWithName => "OP_CACHE_CREATE_WITH_NAME",
            OpCode::CacheDestroy => "OP_CACHE_DESTROY",
            OpCode::QueryScan => "OP_QUERY_SCAN",
            OpCode::QueryScanCursorGetPage => "OP_QUERY_SCAN_CURSOR_GET_PAGE",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Thin client protocol version, `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    pub major: i16,
    pub minor: i16,
    pub patch: i16,
}

impl ProtocolVersion {
    pub const V1_0_0: ProtocolVersion = ProtocolVersion::new(1, 0, 0);
    pub const V1_1_0: ProtocolVersion = ProtocolVersion::new(1, 1, 0);

    /// Versions this client can speak, oldest first.
    pub const SUPPORTED: [ProtocolVersion; 2] = [Self::V1_0_0, Self::V1_1_0];

    pub const fn new(major: i16, minor: i16, patch: i16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    /// Username/password authentication appeared in 1.1.0.
    pub fn supports_auth(&self) -> bool {
        *self >= Self::V1_1_0
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::V1_1_0
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidVersion(s.to_string());
        let parts: Vec<i16> = s
            .trim()
            .split('.')
            .map(|p| p.parse::<i16>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Self::new(*major, *minor, *patch)),
            [major, minor] => Ok(Self::new(*major, *minor, 0)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = ProtocolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(v: ProtocolVersion) -> Self {
        v.to_string()
    }
}

const HANDSHAKE_CODE: i8 = 1;
const THIN_CLIENT_CODE: i8 = 2;

/// Opening message of every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub version: ProtocolVersion,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl HandshakeRequest {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Credentials are sent only when both are set and the version knows them.
    pub fn sends_credentials(&self) -> bool {
        self.version.supports_auth() && self.username.is_some() && self.password.is_some()
    }

    /// Encodes the full handshake frame, length prefix included.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut body = BinaryWriter::with_capacity(64);
        body.write_i8(HANDSHAKE_CODE);
        body.write_i16(self.version.major);
        body.write_i16(self.version.minor);
        body.write_i16(self.version.patch);
        body.write_i8(THIN_CLIENT_CODE);
        if self.sends_credentials() {
            body.write_opt_string(self.username.as_deref())?;
            body.write_opt_string(self.password.as_deref())?;
        }

        if body.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::RequestTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let mut frame = BinaryWriter::with_capacity(4 + body.len());
        frame.write_len(body.len())?;
        frame.write_slice(body.as_bytes());
        Ok(frame.into_inner())
    }
}

/// Node's answer to a [`HandshakeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResponse {
    Accepted,
    Rejected {
        /// Version the node would accept.
        server_version: ProtocolVersion,
        message: String,
        /// Sent only by nodes speaking 1.1.0 or newer.
        status: Option<StatusCode>,
    },
}

impl HandshakeResponse {
    /// Parses a handshake response body (length prefix already stripped).
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = BinaryReader::new(body);
        if reader.read_bool()? {
            return Ok(HandshakeResponse::Accepted);
        }

        let server_version = ProtocolVersion::new(
            reader.read_i16()?,
            reader.read_i16()?,
            reader.read_i16()?,
        );
        let message = if reader.is_empty() {
            String::new()
        } else {
            reader.read_string()?.unwrap_or_default()
        };
        let status = if reader.remaining() >= 4 {
            Some(StatusCode::from_code(reader.read_i32()?))
        } else {
            None
        };
        Ok(HandshakeResponse::Rejected {
            server_version,
            message,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_codes() {
        assert_eq!(OpCode::CacheGet.code(), 1000);
        assert_eq!(OpCode::CacheDestroy.code(), 1056);
        assert_eq!(OpCode::QueryScanCursorGetPage.code(), 2001);
        assert_eq!(OpCode::from_code(1018), Some(OpCode::CacheRemoveKeys));
        assert_eq!(OpCode::from_code(1002), None);
        assert_eq!(OpCode::ResourceClose.to_string(), "OP_RESOURCE_CLOSE");
    }

    #[test]
    fn test_version_parse_and_order() {
        let v: ProtocolVersion = "1.1.0".parse().unwrap();
        assert_eq!(v, ProtocolVersion::V1_1_0);
        assert_eq!("1.0".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V1_0_0);
        assert!("1.x.0".parse::<ProtocolVersion>().is_err());
        assert!("1".parse::<ProtocolVersion>().is_err());
        assert!(ProtocolVersion::V1_0_0 < ProtocolVersion::V1_1_0);
        assert!(ProtocolVersion::V1_1_0.supports_auth());
        assert!(!ProtocolVersion::V1_0_0.supports_auth());
        assert!(!ProtocolVersion::new(1, 2, 0).is_supported());
        assert_eq!(ProtocolVersion::default().to_string(), "1.1.0");
    }

    #[test]
    fn test_handshake_request_without_credentials() {
        let frame = HandshakeRequest::new(ProtocolVersion::V1_1_0).encode().unwrap();
        assert_eq!(&frame[..], &[8, 0, 0, 0, 1, 1, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_handshake_request_with_credentials() {
        let frame = HandshakeRequest::new(ProtocolVersion::V1_1_0)
            .with_credentials("ignite", "pw")
            .encode()
            .unwrap();
        let mut expected = vec![1, 1, 0, 1, 0, 0, 0, 2];
        expected.extend_from_slice(&[9, 6, 0, 0, 0]);
        expected.extend_from_slice(b"ignite");
        expected.extend_from_slice(&[9, 2, 0, 0, 0]);
        expected.extend_from_slice(b"pw");
        assert_eq!(&frame[..4], &(expected.len() as i32).to_le_bytes());
        assert_eq!(&frame[4..], &expected[..]);
    }

    #[test]
    fn test_credentials_dropped_for_old_version() {
        let request = HandshakeRequest::new(ProtocolVersion::V1_0_0).with_credentials("u", "p");
        assert!(!request.sends_credentials());
        assert_eq!(request.encode().unwrap().len(), 12);
    }

    #[test]
    fn test_handshake_accepted() {
        assert_eq!(
            HandshakeResponse::parse(&[1]).unwrap(),
            HandshakeResponse::Accepted
        );
    }

    #[test]
    fn test_handshake_rejected_with_status() {
        let mut w = BinaryWriter::new();
        w.write_bool(false);
        w.write_i16(1);
        w.write_i16(1);
        w.write_i16(0);
        w.write_string("Authentication failed").unwrap();
        w.write_i32(2000);

        match HandshakeResponse::parse(w.as_bytes()).unwrap() {
            HandshakeResponse::Rejected {
                server_version,
                message,
                status,
            } => {
                assert_eq!(server_version, ProtocolVersion::V1_1_0);
                assert_eq!(message, "Authentication failed");
                assert_eq!(status, Some(StatusCode::AuthFailed));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_handshake_rejected_without_status() {
        let mut w = BinaryWriter::new();
        w.write_bool(false);
        w.write_i16(1);
        w.write_i16(0);
        w.write_i16(0);
        w.write_null();

        assert_eq!(
            HandshakeResponse::parse(w.as_bytes()).unwrap(),
            HandshakeResponse::Rejected {
                server_version: ProtocolVersion::V1_0_0,
                message: String::new(),
                status: None,
            }
        );
    }

    #[test]
    fn test_handshake_truncated() {
        assert!(matches!(
            HandshakeResponse::parse(&[0, 1, 0]),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}

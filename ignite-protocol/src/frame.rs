//! Length-prefixed message framing.
//!
//! Every message in either direction starts with a little-endian `i32` giving
//! the length of the rest of the message.
//!
//! ```text
//! request:  | len i32 | op code i16 | request id i64 | payload ...          |
//! response: | len i32 | request id i64 | status i32  | payload / error msg  |
//! ```
//!
//! The handshake exchange uses the same length prefix with its own body; see
//! [`crate::message`].

use crate::codec::BinaryReader;
use crate::error::{ProtocolError, StatusCode};
use crate::message::OpCode;
use crate::MAX_FRAME_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Op code plus request id.
pub const REQUEST_HEADER_SIZE: usize = 10;

/// Request id plus status.
pub const RESPONSE_HEADER_SIZE: usize = 12;

/// Builds a complete request frame, length prefix included.
pub fn build_request(op: OpCode, request_id: i64, payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    let len = REQUEST_HEADER_SIZE + payload.len();
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::RequestTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + len);
    buf.put_i32_le(len as i32);
    buf.put_i16_le(op.code());
    buf.put_i64_le(request_id);
    buf.put_slice(payload);
    Ok(buf)
}

/// Fixed part of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub request_id: i64,
    pub status: StatusCode,
}

/// A response body split into header and payload.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    /// Operation payload on success, error message object otherwise.
    pub payload: Bytes,
}

impl ResponseFrame {
    /// Parses a frame body (length prefix already stripped).
    pub fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        if body.len() < RESPONSE_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                needed: RESPONSE_HEADER_SIZE,
                available: body.len(),
                position: LENGTH_PREFIX_SIZE,
            });
        }
        let request_id = body.get_i64_le();
        let status = StatusCode::from_code(body.get_i32_le());
        Ok(Self {
            header: ResponseHeader { request_id, status },
            payload: body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.header.status.is_success()
    }

    /// Reads the error message that follows a non-zero status.
    ///
    /// A missing or null message yields an empty string.
    pub fn error_message(&self) -> Result<String, ProtocolError> {
        if self.payload.is_empty() {
            return Ok(String::new());
        }
        let mut reader = BinaryReader::new(&self.payload);
        Ok(reader.read_string()?.unwrap_or_default())
    }
}

/// Accumulates bytes read from the socket and splits them into frames.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_capacity(8 * 1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Buffer to read socket data into.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Splits off the next complete frame body, without its length prefix.
    ///
    /// Returns `Ok(None)` until enough bytes have been buffered.
    pub fn decode_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let len = i32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let len = usize::try_from(len).map_err(|_| ProtocolError::InvalidLength {
            length: i64::from(len),
            position: 0,
        })?;
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if self.buf.len() < LENGTH_PREFIX_SIZE + len {
            self.buf.reserve(LENGTH_PREFIX_SIZE + len - self.buf.len());
            return Ok(None);
        }

        self.buf.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(self.buf.split_to(len).freeze()))
    }
}

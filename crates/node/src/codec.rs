//! Application message framing.
//!
//! # Wire Format
//!
//! Every request and reply starts with a fixed 17-byte header and is padded
//! with zeros up to its declared length:
//!
//! ```text
//! - Bytes 0-3:   Total length including header (u32, big-endian)
//! - Bytes 4-7:   Expected reply length (u32)
//! - Bytes 8-15:  Reply delay hint in microseconds (u64)
//! - Byte  16:    Flags (bit 0: server should close, bit 1: this is a reply)
//! - Bytes 17-..: Padding
//! ```
//!
//! Stream transports may split or coalesce frames, so the receiving side
//! runs a [`ReassemblyQueue`] per connection and pops every complete frame.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 17;

const FLAG_SERVER_CLOSE: u8 = 0b01;
const FLAG_REPLY: u8 = 0b10;

/// Errors from frame decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame declares length {0}, shorter than its header")]
    InvalidLength(u32),

    #[error("datagram of {actual} bytes, header declares {declared}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("unknown flags {0:#04x}")]
    UnknownFlags(u8),
}

/// One application request or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppMessage {
    /// Total frame length in bytes, at least [`HEADER_LEN`].
    pub length: u32,
    /// Bytes the receiver should answer with.
    pub expected_reply_length: u32,
    /// Extra delay the server should add before answering.
    pub reply_delay: Duration,
    /// The server should close the connection after answering.
    pub server_close: bool,
    /// This frame answers an earlier request.
    pub is_reply: bool,
}

impl AppMessage {
    /// A request of `length` bytes asking for `expected_reply_length` back.
    pub fn request(length: u32, expected_reply_length: u32) -> Self {
        Self {
            length: length.max(HEADER_LEN as u32),
            expected_reply_length,
            reply_delay: Duration::ZERO,
            server_close: false,
            is_reply: false,
        }
    }

    /// The reply to this request.
    pub fn reply(&self) -> Self {
        Self {
            length: self.expected_reply_length.max(HEADER_LEN as u32),
            expected_reply_length: 0,
            reply_delay: Duration::ZERO,
            server_close: self.server_close,
            is_reply: true,
        }
    }

    pub fn with_server_close(mut self, server_close: bool) -> Self {
        self.server_close = server_close;
        self
    }

    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// Encode into a frame of exactly `length` bytes.
    pub fn encode(&self) -> Bytes {
        let length = self.length.max(HEADER_LEN as u32);
        let mut buf = BytesMut::with_capacity(length as usize);
        buf.put_u32(length);
        buf.put_u32(self.expected_reply_length);
        buf.put_u64(u64::try_from(self.reply_delay.as_micros()).unwrap_or(u64::MAX));
        let mut flags = 0;
        if self.server_close {
            flags |= FLAG_SERVER_CLOSE;
        }
        if self.is_reply {
            flags |= FLAG_REPLY;
        }
        buf.put_u8(flags);
        buf.resize(length as usize, 0);
        buf.freeze()
    }

    /// Decode a complete datagram.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>, CodecError> {
        if bytes.len() < HEADER_LEN {
            return Ok(None);
        }
        let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if declared as usize != bytes.len() {
            return Err(CodecError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }
        Self::parse_header(&bytes[..HEADER_LEN]).map(Some)
    }

    fn parse_header(mut header: &[u8]) -> Result<Self, CodecError> {
        let length = header.get_u32();
        if (length as usize) < HEADER_LEN {
            return Err(CodecError::InvalidLength(length));
        }
        let expected_reply_length = header.get_u32();
        let reply_delay = Duration::from_micros(header.get_u64());
        let flags = header.get_u8();
        if flags & !(FLAG_SERVER_CLOSE | FLAG_REPLY) != 0 {
            return Err(CodecError::UnknownFlags(flags));
        }
        Ok(Self {
            length,
            expected_reply_length,
            reply_delay,
            server_close: flags & FLAG_SERVER_CLOSE != 0,
            is_reply: flags & FLAG_REPLY != 0,
        })
    }
}

/// Per-connection byte queue that yields complete frames.
#[derive(Debug, Default)]
pub struct ReassemblyQueue {
    buf: BytesMut,
}

impl ReassemblyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes received from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn pop(&mut self) -> Result<Option<AppMessage>, CodecError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let message = AppMessage::parse_header(&self.buf[..HEADER_LEN])?;
        if self.buf.len() < message.length as usize {
            return Ok(None);
        }
        self.buf.advance(message.length as usize);
        Ok(Some(message))
    }

    /// Bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

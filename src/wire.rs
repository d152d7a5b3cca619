// Wire format primitives: one-byte header alphabet and message codec.
// Numan Thabit 2026

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Length of the random alphanumeric token carried by a PING payload.
pub const PING_TOKEN_LEN: usize = 13;

/// Errors produced while decoding a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Zero-length datagram; there is no header byte to read.
    #[error("empty datagram")]
    Empty,

    /// First byte falls outside the header alphabet.
    #[error("unknown header byte {0:#04x}")]
    UnknownHeader(u8),
}

/// Message headers. Each occupies exactly one ASCII byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Header {
    /// Peer announcement carrying a decimal peer id.
    Hello = b'h',
    /// Latency probe request carrying a random token.
    Ping = b'i',
    /// Latency probe reply: one decimal digit plus the echoed token.
    Pong = b'o',
    /// Keepalive liveness check, empty payload.
    Request = b'q',
    /// Keepalive acknowledgement, empty payload.
    Response = b's',
}

impl Header {
    /// Wire byte for this header.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// All headers, in wire-alphabet order.
    pub const fn all() -> [Header; 5] {
        [
            Header::Hello,
            Header::Ping,
            Header::Pong,
            Header::Request,
            Header::Response,
        ]
    }
}

impl TryFrom<u8> for Header {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'h' => Ok(Header::Hello),
            b'i' => Ok(Header::Ping),
            b'o' => Ok(Header::Pong),
            b'q' => Ok(Header::Request),
            b's' => Ok(Header::Response),
            other => Err(WireError::UnknownHeader(other)),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Header::Hello => "HELLO",
            Header::Ping => "PING",
            Header::Pong => "PONG",
            Header::Request => "REQUEST",
            Header::Response => "RESPONSE",
        };
        f.write_str(name)
    }
}

/// A protocol message. Owned value, scoped to the handling of one datagram.
///
/// There is no length field anywhere: message boundaries come entirely from
/// datagram framing, so `decode` consumes a whole received datagram and
/// `encode` produces a whole one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub payload: Bytes,
}

impl Message {
    pub fn new(header: Header, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// HELLO announcing the given peer id as a decimal payload.
    pub fn hello(id: u32) -> Self {
        Self::new(Header::Hello, Bytes::from(id.to_string().into_bytes()))
    }

    /// PING carrying a probe token.
    pub fn ping(token: &str) -> Self {
        Self::new(Header::Ping, Bytes::copy_from_slice(token.as_bytes()))
    }

    /// PONG answering a PING: one decimal digit (0..=9) prepended to the
    /// echoed ping payload. The digit carries no meaning beyond presence.
    pub fn pong(digit: u8, echoed: &[u8]) -> Self {
        debug_assert!(digit < 10, "pong digit must be a single decimal digit");
        let mut payload = BytesMut::with_capacity(1 + echoed.len());
        payload.put_u8(b'0' + digit);
        payload.extend_from_slice(echoed);
        Self::new(Header::Pong, payload.freeze())
    }

    /// Keepalive REQUEST, empty payload.
    pub fn request() -> Self {
        Self::new(Header::Request, Bytes::new())
    }

    /// Keepalive RESPONSE, empty payload.
    pub fn response() -> Self {
        Self::new(Header::Response, Bytes::new())
    }

    /// Serializes into a single datagram: header byte, then the payload.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.header.as_byte());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parses one received datagram.
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        let (&first, rest) = datagram.split_first().ok_or(WireError::Empty)?;
        let header = Header::try_from(first)?;
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(rest),
        })
    }

    /// Payload viewed as text, when it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

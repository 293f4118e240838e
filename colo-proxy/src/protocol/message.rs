//! Control-channel message codec.
//!
//! # Wire Format
//!
//! Every frame starts with the 16-byte netlink header, in host byte order:
//!
//! ```text
//! ┌────────────┬──────────┬──────────┬────────────┬──────────────────┐
//! │ Length (4) │ Type (2) │ Flags (2)│ Seq (4)    │ Session index (4)│
//! └────────────┴──────────┴──────────┴────────────┴──────────────────┘
//! ```
//!
//! Requests from the client are header-only. Replies from the kernel carry:
//! - type [`msg_type::ERROR`]: `[code:i32][echoed request header:16]`
//! - any operation type: `[is_checkpoint:u8]`
//!
//! Payload bytes are only read after the declared length and the received
//! buffer are both known to cover them.

use std::fmt;

use thiserror::Error;

use crate::net::SessionIndex;

/// Netlink header size (`NLMSG_HDRLEN`).
pub const HEADER_SIZE: usize = 16;

/// Error payload size: error code plus the echoed request header.
pub const ERROR_PAYLOAD_SIZE: usize = 4 + HEADER_SIZE;

/// Checkpoint event payload size (one boolean byte).
pub const CHECKPOINT_PAYLOAD_SIZE: usize = 1;

/// Reserved netlink message types.
pub mod msg_type {
    /// Generic error/acknowledgment frame (`NLMSG_ERROR`).
    pub const ERROR: u16 = 0x2;
    /// First type available to protocol families (`NLMSG_MIN_TYPE`).
    pub const MIN_TYPE: u16 = 0x10;
}

/// Header flag bits.
pub mod flags {
    /// Frame is a request (`NLM_F_REQUEST`).
    pub const REQUEST: u16 = 0x1;
    /// Ask the kernel for an acknowledgment (`NLM_F_ACK`).
    pub const ACK: u16 = 0x4;
}

/// Operations understood by the COLO proxy module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OperationCode {
    QueryCheckpoint = msg_type::MIN_TYPE + 1,
    Checkpoint,
    Failover,
    ProxyInit,
    /// Reserved for continuous fault tolerance; no current flow sends it.
    ProxyReset,
}

impl OperationCode {
    /// Raw wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for OperationCode {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        const QUERY: u16 = OperationCode::QueryCheckpoint as u16;
        const CHECKPOINT: u16 = OperationCode::Checkpoint as u16;
        const FAILOVER: u16 = OperationCode::Failover as u16;
        const INIT: u16 = OperationCode::ProxyInit as u16;
        const RESET: u16 = OperationCode::ProxyReset as u16;
        match raw {
            QUERY => Ok(Self::QueryCheckpoint),
            CHECKPOINT => Ok(Self::Checkpoint),
            FAILOVER => Ok(Self::Failover),
            INIT => Ok(Self::ProxyInit),
            RESET => Ok(Self::ProxyReset),
            other => Err(ProtocolError::UnknownOperation(other)),
        }
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryCheckpoint => "query-checkpoint",
            Self::Checkpoint => "checkpoint",
            Self::Failover => "failover",
            Self::ProxyInit => "proxy-init",
            Self::ProxyReset => "proxy-reset",
        };
        f.write_str(name)
    }
}

/// Errors while decoding a frame, including a failure the kernel reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Received bytes do not cover the header or the claimed payload.
    #[error("buffer too small: need {need} bytes, have {have}")]
    BufferTooSmall { need: usize, have: usize },
    /// The header's length field is shorter than its type requires.
    #[error("declared length {declared} is shorter than {need}")]
    DeclaredLengthTooShort { declared: u32, need: usize },
    /// Type value outside the operation range.
    #[error("unknown operation: 0x{0:04x}")]
    UnknownOperation(u16),
    /// Error frame carrying a nonzero code.
    #[error("kernel reported error {0}")]
    KernelReported(i32),
}

/// Decoded netlink header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total frame length, header included.
    pub len: u32,
    /// Message type: [`msg_type::ERROR`] or an [`OperationCode`] value.
    pub kind: u16,
    /// See [`flags`].
    pub flags: u16,
    /// Always 0 on frames this client sends.
    pub seq: u32,
    /// Sender's port id; the session index on client frames.
    pub index: u32,
}

impl Header {
    /// Header for a header-only request.
    #[must_use]
    pub const fn request(op: OperationCode, index: SessionIndex, want_ack: bool) -> Self {
        let flags = if want_ack {
            flags::REQUEST | flags::ACK
        } else {
            flags::REQUEST
        };
        Self {
            len: HEADER_SIZE as u32,
            kind: op.as_u16(),
            flags,
            seq: 0,
            index: index.as_u32(),
        }
    }

    /// Returns `true` for the generic error/ack type.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.kind == msg_type::ERROR
    }

    /// Encodes the header into its wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.len.to_ne_bytes());
        out[4..6].copy_from_slice(&self.kind.to_ne_bytes());
        out[6..8].copy_from_slice(&self.flags.to_ne_bytes());
        out[8..12].copy_from_slice(&self.seq.to_ne_bytes());
        out[12..16].copy_from_slice(&self.index.to_ne_bytes());
        out
    }

    /// Decodes the leading header of `bytes`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::BufferTooSmall`] if fewer than [`HEADER_SIZE`] bytes
    /// are available.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = FrameReader::new(bytes);
        r.require(HEADER_SIZE)?;
        Ok(Self {
            len: r.take_u32()?,
            kind: r.take_u16()?,
            flags: r.take_u16()?,
            seq: r.take_u32()?,
            index: r.take_u32()?,
        })
    }

    /// Fails unless the declared length covers `payload` bytes after the header.
    fn require_declared(&self, payload: usize) -> Result<(), ProtocolError> {
        let need = HEADER_SIZE + payload;
        if (self.len as usize) < need {
            return Err(ProtocolError::DeclaredLengthTooShort {
                declared: self.len,
                need,
            });
        }
        Ok(())
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Error-typed frame with a zero code.
    Ack(Header),
    /// Any other type; the payload is left for the caller to interpret.
    Message(Header),
}

impl Inbound {
    #[must_use]
    pub const fn header(&self) -> &Header {
        match self {
            Self::Ack(h) | Self::Message(h) => h,
        }
    }
}

/// Reader for decoding frames; every take is bounds-checked.
struct FrameReader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> FrameReader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    fn require(&self, need: usize) -> Result<(), ProtocolError> {
        if self.remaining() < need {
            return Err(ProtocolError::BufferTooSmall {
                need,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        self.require(N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(&self.buf[self.cursor..self.cursor + N]);
        self.cursor += N;
        Ok(arr)
    }

    fn take_u8(&mut self) -> Result<u8, ProtocolError> {
        self.take::<1>().map(|[b]| b)
    }

    fn take_u16(&mut self) -> Result<u16, ProtocolError> {
        self.take().map(u16::from_ne_bytes)
    }

    fn take_u32(&mut self) -> Result<u32, ProtocolError> {
        self.take().map(u32::from_ne_bytes)
    }

    fn take_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take().map(i32::from_ne_bytes)
    }
}

/// Builds a header-only request frame.
///
/// `want_ack` sets [`flags::ACK`]; the session layer asks for it only on
/// [`OperationCode::ProxyInit`].
#[must_use]
pub fn encode_request(op: OperationCode, index: SessionIndex, want_ack: bool) -> [u8; HEADER_SIZE] {
    Header::request(op, index, want_ack).encode()
}

/// Parses the leading header and classifies the frame.
///
/// For error-typed frames the error payload must be fully present before the
/// code is read.
///
/// # Errors
///
/// - [`ProtocolError::BufferTooSmall`] / [`ProtocolError::DeclaredLengthTooShort`]
///   for truncated or inconsistent frames
/// - [`ProtocolError::KernelReported`] for an error frame with a nonzero code
pub fn decode_frame(bytes: &[u8]) -> Result<Inbound, ProtocolError> {
    let header = Header::decode(bytes)?;
    header.require_declared(0)?;

    if !header.is_error() {
        return Ok(Inbound::Message(header));
    }

    let mut r = FrameReader::new(&bytes[HEADER_SIZE..]);
    r.require(ERROR_PAYLOAD_SIZE)?;
    match r.take_i32()? {
        0 => Ok(Inbound::Ack(header)),
        code => Err(ProtocolError::KernelReported(code)),
    }
}

/// Extracts the checkpoint flag from a non-error frame.
///
/// # Errors
///
/// Fails if either the declared length or the received bytes are shorter than
/// header plus [`CHECKPOINT_PAYLOAD_SIZE`].
pub fn decode_checkpoint(header: &Header, bytes: &[u8]) -> Result<bool, ProtocolError> {
    header.require_declared(CHECKPOINT_PAYLOAD_SIZE)?;
    let mut r = FrameReader::new(bytes.get(HEADER_SIZE..).unwrap_or_default());
    Ok(r.take_u8()? != 0)
}

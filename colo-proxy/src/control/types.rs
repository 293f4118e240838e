//! Session states, poll outcomes and the session error taxonomy.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::reassembly::ReceiveError;

/// Lifecycle of a [`Session`](super::Session).
///
/// `Uninitialized` and `Bound` are only observable inside setup: a failed
/// setup returns an error instead of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    /// Socket open and bound to a session index; handshake pending.
    Bound,
    /// Handshake acknowledged; checkpoints may be requested and polled.
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Bound => "bound",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of one successful checkpoint poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Nothing arrived before the timeout, or the kernel said "not now".
    NoEvent,
    /// The kernel asks for a checkpoint.
    DoCheckpoint,
}

impl Checkpoint {
    /// Integer form: 0 for no event, 1 for checkpoint.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::NoEvent => 0,
            Self::DoCheckpoint => 1,
        }
    }
}

/// Integer form of a poll result: -1 error, 0 no event, 1 checkpoint.
#[must_use]
pub fn status_code(result: &Result<Checkpoint, SessionError>) -> i32 {
    match result {
        Ok(checkpoint) => checkpoint.code(),
        Err(_) => -1,
    }
}

/// Errors from session setup and steady-state operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The netlink socket could not be created.
    #[error("can not create a netlink socket: {0}")]
    SocketCreate(io::Error),
    /// Bind failed for a reason other than the index being taken.
    #[error("netlink bind error: {0}")]
    Bind(io::Error),
    /// Every candidate session index was in use.
    #[error("all {tried} session indices are in use")]
    BindExhausted { tried: usize },
    #[error("can't send msg to kernel by netlink: {0}")]
    Send(io::Error),
    #[error(transparent)]
    Receive(#[from] ReceiveError),
    /// Frame too short for its header or claimed payload.
    #[error("malformed message: {0}")]
    Malformed(ProtocolError),
    /// The kernel answered with a nonzero error code.
    #[error("kernel reported error {0}")]
    KernelReported(i32),
    /// An error-typed frame arrived where a checkpoint event was expected.
    #[error("unexpected acknowledgment frame")]
    UnexpectedAck,
    #[error("no acknowledgment from kernel within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("session is closed")]
    Closed,
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::KernelReported(code) => Self::KernelReported(code),
            other => Self::Malformed(other),
        }
    }
}

//! The narrow interface the protocol layer needs from a control channel.
//!
//! [`NetlinkSocket`](super::NetlinkSocket) is the production implementation.
//! Anything else implementing [`Transport`] (an in-memory script, a recorder)
//! can drive the codec, reassembly and session state machine without a
//! privileged kernel module.

use std::io;
use std::time::Duration;

use super::SessionIndex;

/// Timeout specification for blocking receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until data arrives (a zero `SO_RCVTIMEO`).
    Infinite,
    /// Give up after at most the specified duration.
    Duration(Duration),
}

impl Timeout {
    /// Returns `true` for a finite timeout.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        matches!(self, Self::Duration(_))
    }
}

impl From<Duration> for Timeout {
    /// A zero duration means "no timeout", matching socket semantics.
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Self::Infinite
        } else {
            Self::Duration(d)
        }
    }
}

/// One completed receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Bytes written into the caller's buffer.
    pub len: usize,
    /// The kernel flagged the datagram as truncated (`MSG_TRUNC`).
    pub truncated: bool,
}

/// Raw control-channel operations.
///
/// Every method takes `&mut self`: the receive timeout is socket-level state,
/// so a transport has exactly one logical owner at a time.
pub trait Transport {
    /// Binds the local end to `index`.
    ///
    /// # Errors
    ///
    /// `ErrorKind::AddrInUse` when another socket already holds the index;
    /// anything else is a hard bind failure.
    fn bind(&mut self, index: SessionIndex) -> io::Result<()>;

    /// Sends one datagram to the kernel, returning the bytes sent.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the transport is closed.
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize>;

    /// Receives one datagram (or the leading part of it) into `buf`.
    ///
    /// # Errors
    ///
    /// `ErrorKind::WouldBlock` when a receive timeout expired with no data.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Fragment>;

    /// Installs the receive timeout; [`Timeout::Infinite`] restores blocking.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    fn set_recv_timeout(&mut self, timeout: Timeout) -> io::Result<()>;

    /// Releases the underlying resource. Calling it again is a no-op.
    fn close(&mut self);

    /// Returns `true` until [`close`](Transport::close) has run.
    fn is_open(&self) -> bool;
}

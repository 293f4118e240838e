//! Receive path: one logically complete inbound message per call.
//!
//! The kernel may deliver a message larger than the receive buffer with the
//! truncation flag set. The buffer then grows by a fixed increment and the
//! next receive appends at the current write offset, until a fragment arrives
//! without the flag. Growth is capped by [`RecvLimits::max`].
//!
//! A finite timeout is installed on the transport for the duration of one
//! call only. [`RecvTimeoutGuard`] restores blocking mode on every exit path,
//! so no residual timeout reaches later, unrelated receives.

use std::io::{self, ErrorKind};
use std::ops::{Deref, DerefMut};

use minstant::Instant;
use thiserror::Error;

use crate::config::RecvLimits;
use crate::net::{Timeout, Transport};
use crate::trace::{trace, warn};

/// Outcome of a receive that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// The reassembled message; its length is the accumulated byte count.
    Complete(Vec<u8>),
    /// No datagram arrived before the timeout expired.
    TimedOut,
}

/// Hard receive failures.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The transport failed (anything other than an expired timeout).
    #[error("receive failed: {0}")]
    Io(#[from] io::Error),
    /// The receive timeout could not be installed.
    #[error("failed to set receive timeout: {0}")]
    SetTimeout(io::Error),
    /// The peer kept flagging truncation past the configured cap.
    #[error("message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },
    /// The timeout expired between fragments of one message.
    #[error("timed out after {received} bytes of a truncated message")]
    Incomplete { received: usize },
}

/// Installs a finite receive timeout and restores blocking mode on drop.
///
/// With [`Timeout::Infinite`] the guard touches nothing, in either direction.
pub struct RecvTimeoutGuard<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    armed: bool,
}

impl<'a, T: Transport + ?Sized> RecvTimeoutGuard<'a, T> {
    /// Applies `timeout` to `transport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the option; nothing is left
    /// to restore in that case.
    pub fn install(transport: &'a mut T, timeout: Timeout) -> io::Result<Self> {
        let armed = timeout.is_finite();
        if armed {
            transport.set_recv_timeout(timeout)?;
        }
        Ok(Self { transport, armed })
    }
}

impl<T: Transport + ?Sized> Deref for RecvTimeoutGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.transport
    }
}

impl<T: Transport + ?Sized> DerefMut for RecvTimeoutGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: Transport + ?Sized> Drop for RecvTimeoutGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed
            && let Err(error) = self.transport.set_recv_timeout(Timeout::Infinite)
        {
            warn!(%error, "failed to restore blocking receive");
        }
    }
}

/// Receives one complete message from `transport`.
///
/// # Errors
///
/// See [`ReceiveError`]. An expired timeout before the first fragment is not
/// an error; it yields [`Received::TimedOut`].
pub fn receive<T: Transport + ?Sized>(
    transport: &mut T,
    timeout: Timeout,
    limits: RecvLimits,
) -> Result<Received, ReceiveError> {
    let started = Instant::now();
    let mut transport = RecvTimeoutGuard::install(transport, timeout)
        .map_err(ReceiveError::SetTimeout)?;

    let mut buf = vec![0u8; limits.initial];
    let mut len = 0usize;

    loop {
        let fragment = match transport.recv(&mut buf[len..]) {
            Ok(fragment) => fragment,
            Err(e) if e.kind() == ErrorKind::WouldBlock && timeout.is_finite() => {
                if len > 0 {
                    return Err(ReceiveError::Incomplete { received: len });
                }
                trace!(
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "receive timed out"
                );
                return Ok(Received::TimedOut);
            }
            Err(e) => return Err(ReceiveError::Io(e)),
        };

        len += fragment.len;
        if !fragment.truncated {
            break;
        }

        let grown = buf.len() + limits.increment;
        if limits.increment == 0 || grown > limits.max {
            return Err(ReceiveError::MessageTooLarge { limit: limits.max });
        }
        trace!(received = len, capacity = grown, "truncated fragment, growing buffer");
        buf.resize(grown, 0);
    }

    buf.truncate(len);
    trace!(
        bytes = len,
        elapsed_us = started.elapsed().as_micros() as u64,
        "message received"
    );
    Ok(Received::Complete(buf))
}

//! Session index allocation and the `ProxyInit` handshake.

use std::io::{self, ErrorKind};
use std::ops::RangeInclusive;

use crate::config::RecvLimits;
use crate::control::types::SessionError;
use crate::net::{SessionIndex, Timeout, Transport};
use crate::protocol::{Inbound, OperationCode, decode_frame, encode_request};
use crate::reassembly::{Received, receive};
use crate::trace::{debug, error, warn};

/// Binds `transport` to the first free index in `range`, in ascending order.
///
/// # Errors
///
/// - [`SessionError::BindExhausted`] if every candidate reported in-use
/// - [`SessionError::Bind`] on any other bind failure (no further candidates
///   are tried)
pub fn bind_session<T: Transport + ?Sized>(
    transport: &mut T,
    range: RangeInclusive<u32>,
) -> Result<SessionIndex, SessionError> {
    let mut tried = 0;
    for index in SessionIndex::candidates(range) {
        tried += 1;
        match transport.bind(index) {
            Ok(()) => {
                debug!(%index, "bound control channel");
                return Ok(index);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!(%index, "session index already in use");
            }
            Err(e) => {
                error!(%index, error = %e, "netlink bind error");
                return Err(SessionError::Bind(e));
            }
        }
    }
    error!(tried, "no free session index");
    Err(SessionError::BindExhausted { tried })
}

/// Sends a header-only request for `op`, returning the bytes sent.
///
/// Failures are logged here and not retried.
///
/// # Errors
///
/// [`SessionError::Send`] if the transport fails or sends nothing.
pub fn send_request<T: Transport + ?Sized>(
    transport: &mut T,
    op: OperationCode,
    index: SessionIndex,
    want_ack: bool,
) -> Result<usize, SessionError> {
    let frame = encode_request(op, index, want_ack);
    let result = match transport.send(&frame) {
        Ok(0) => Err(io::Error::from(ErrorKind::WriteZero)),
        other => other,
    };
    result.map_err(|e| {
        error!(%op, %index, error = %e, "can't send msg to kernel by netlink");
        SessionError::Send(e)
    })
}

/// Registers `index` with the kernel module and waits for its acknowledgment.
///
/// An empty reply, a zero-code acknowledgment and a non-error frame all count
/// as success.
///
/// # Errors
///
/// - [`SessionError::HandshakeTimeout`] if nothing arrives within `timeout`
/// - [`SessionError::KernelReported`] for a nonzero acknowledgment code
/// - [`SessionError::Malformed`] for a truncated acknowledgment
/// - send and receive failures
pub fn client_handshake<T: Transport + ?Sized>(
    transport: &mut T,
    index: SessionIndex,
    timeout: Timeout,
    limits: RecvLimits,
) -> Result<(), SessionError> {
    send_request(transport, OperationCode::ProxyInit, index, true)?;

    let reply = match receive(transport, timeout, limits)? {
        Received::Complete(reply) => reply,
        Received::TimedOut => {
            let waited = match timeout {
                Timeout::Duration(d) => d,
                Timeout::Infinite => Default::default(),
            };
            return Err(SessionError::HandshakeTimeout(waited));
        }
    };

    if reply.is_empty() {
        debug!(%index, "empty handshake reply");
        return Ok(());
    }

    match decode_frame(&reply)? {
        Inbound::Ack(_) => {
            debug!(%index, "handshake acknowledged");
        }
        Inbound::Message(header) => {
            debug!(%index, kind = header.kind, "non-error handshake reply accepted");
        }
    }
    Ok(())
}

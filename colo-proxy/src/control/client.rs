//! Client-side session with the COLO proxy kernel module.

use std::fmt;
use std::io;

use crate::config::{ProxyConfig, RecvLimits};
use crate::control::handshake::{bind_session, client_handshake, send_request};
use crate::control::types::{Checkpoint, SessionError, SessionState};
use crate::net::{NetlinkSocket, SessionIndex, Timeout, Transport};
use crate::protocol::{Inbound, OperationCode, decode_checkpoint, decode_frame};
use crate::reassembly::{Received, receive};
use crate::trace::{debug, error, info};

/// A bound, acknowledged control channel.
///
/// Created via [`Session::setup()`]. `ctx` is the caller's operation context;
/// it only appears in diagnostics and must outlive the session.
///
/// Every operation takes `&mut self`: receives reconfigure the socket's
/// timeout, so a session has a single logical owner.
pub struct Session<'ctx, T: Transport = NetlinkSocket> {
    transport: T,
    index: SessionIndex,
    state: SessionState,
    limits: RecvLimits,
    ctx: &'ctx dyn fmt::Display,
}

impl<'ctx> Session<'ctx, NetlinkSocket> {
    /// Opens the netlink socket, binds a session index and performs the
    /// `ProxyInit` handshake.
    ///
    /// # Errors
    ///
    /// Any failure closes the socket before returning; see [`SessionError`].
    pub fn setup(ctx: &'ctx dyn fmt::Display, config: &ProxyConfig) -> Result<Self, SessionError> {
        Self::setup_with(ctx, config, || NetlinkSocket::open(config.protocol))
    }
}

impl<'ctx, T: Transport> Session<'ctx, T> {
    /// Like [`Session::setup`], over a transport produced by `open`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::SocketCreate`] if `open` fails
    /// - [`SessionError::BindExhausted`] / [`SessionError::Bind`]
    /// - any handshake failure
    pub fn setup_with(
        ctx: &'ctx dyn fmt::Display,
        config: &ProxyConfig,
        open: impl FnOnce() -> io::Result<T>,
    ) -> Result<Self, SessionError> {
        let mut transport = open().map_err(|e| {
            error!(%ctx, error = %e, "can not create a netlink socket");
            SessionError::SocketCreate(e)
        })?;

        let index = match bind_session(&mut transport, config.index_range()) {
            Ok(index) => index,
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };

        let mut session = Self {
            transport,
            index,
            state: SessionState::Bound,
            limits: config.recv_limits(),
            ctx,
        };

        let timeout = Timeout::from(config.handshake_timeout());
        if let Err(e) = client_handshake(&mut session.transport, index, timeout, session.limits) {
            error!(%ctx, %index, error = %e, "colo proxy handshake failed");
            session.teardown();
            return Err(e);
        }

        session.state = SessionState::Ready;
        info!(%ctx, %index, "colo proxy session ready");
        Ok(session)
    }

    /// The session index assigned during bind.
    #[must_use]
    pub const fn index(&self) -> SessionIndex {
        self.index
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while the underlying transport is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// The operation context supplied at setup.
    #[must_use]
    pub fn context(&self) -> &'ctx dyn fmt::Display {
        self.ctx
    }

    /// Tells the kernel a checkpoint is starting.
    ///
    /// A send failure is logged and otherwise ignored; use
    /// [`try_preresume`](Self::try_preresume) to observe it.
    pub fn preresume(&mut self) {
        // TODO: report lost checkpoint requests once the orchestrator can
        // fail over on them.
        let _ = self.try_preresume();
    }

    /// Sends the `Checkpoint` request and reports the outcome.
    ///
    /// # Errors
    ///
    /// [`SessionError::Closed`] after teardown, [`SessionError::Send`] on
    /// transport failure. The session stays usable either way.
    pub fn try_preresume(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        send_request(&mut self.transport, OperationCode::Checkpoint, self.index, false)?;
        debug!(ctx = %self.ctx, index = %self.index, "checkpoint requested");
        Ok(())
    }

    /// Called after the secondary resumes. The kernel needs nothing here.
    pub fn postresume(&mut self) {}

    /// Waits up to `timeout` for a checkpoint event from the kernel.
    ///
    /// A zero duration blocks until a message arrives.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Receive`] for transport failures
    /// - [`SessionError::UnexpectedAck`] / [`SessionError::KernelReported`]
    ///   for error-typed frames
    /// - [`SessionError::Malformed`] if the event payload is missing
    ///
    /// Errors leave the session valid; the caller decides whether to retry.
    pub fn poll_checkpoint(
        &mut self,
        timeout: impl Into<Timeout>,
    ) -> Result<Checkpoint, SessionError> {
        self.ensure_open()?;

        let buf = match receive(&mut self.transport, timeout.into(), self.limits) {
            Ok(Received::Complete(buf)) if !buf.is_empty() => buf,
            Ok(_) => return Ok(Checkpoint::NoEvent),
            Err(e) => {
                error!(ctx = %self.ctx, error = %e, "can't recv msg from kernel by netlink");
                return Err(e.into());
            }
        };

        let header = match decode_frame(&buf) {
            Ok(Inbound::Message(header)) => header,
            Ok(Inbound::Ack(_)) => {
                error!(ctx = %self.ctx, "receive NLMSG_ERROR");
                return Err(SessionError::UnexpectedAck);
            }
            Err(e) => {
                error!(ctx = %self.ctx, error = %e, "bad checkpoint frame");
                return Err(e.into());
            }
        };

        let requested = decode_checkpoint(&header, &buf).map_err(|e| {
            error!(ctx = %self.ctx, error = %e, "NLMSG_LENGTH is too short");
            SessionError::from(e)
        })?;

        Ok(if requested {
            Checkpoint::DoCheckpoint
        } else {
            Checkpoint::NoEvent
        })
    }

    /// Closes the channel. Safe to call any number of times.
    pub fn teardown(&mut self) {
        if self.transport.is_open() {
            debug!(ctx = %self.ctx, index = %self.index, "closing colo proxy session");
        }
        self.transport.close();
        self.state = SessionState::Closed;
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed || !self.transport.is_open() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

impl<T: Transport> fmt::Debug for Session<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("ctx", &format_args!("{}", self.ctx))
            .field("index", &self.index)
            .field("state", &self.state)
            .field("open", &self.transport.is_open())
            .finish_non_exhaustive()
    }
}

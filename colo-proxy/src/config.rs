//! Tunables for the control channel.
//!
//! The defaults match what the kernel module expects; an orchestrator that
//! keeps its own configuration file can embed [`ProxyConfig`] in it, since
//! every field falls back to its default when absent.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::Deserialize;

use crate::net::NETLINK_COLO;
use crate::net::index::{FIRST_INDEX, LAST_INDEX};

/// Initial receive buffer, and the amount it grows by per truncated fragment.
pub const RECV_CHUNK: usize = 16 * 1024;

/// Default cap on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// How long setup waits for the kernel to acknowledge `ProxyInit`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// Control-channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Netlink protocol number the kernel module registered.
    pub protocol: u32,
    /// First session index tried on bind.
    pub first_index: u32,
    /// Last session index tried on bind (inclusive).
    pub last_index: u32,
    /// Handshake acknowledgment timeout, in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Initial receive buffer size in bytes.
    pub recv_chunk: usize,
    /// Growth step after a truncated fragment.
    pub recv_increment: usize,
    /// Upper bound on a reassembled message.
    ///
    /// A peer that keeps flagging truncation would otherwise grow the buffer
    /// without limit.
    pub max_message_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            protocol: NETLINK_COLO,
            first_index: FIRST_INDEX,
            last_index: LAST_INDEX,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT.as_millis() as u64,
            recv_chunk: RECV_CHUNK,
            recv_increment: RECV_CHUNK,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ProxyConfig {
    /// Session indices in bind order.
    #[must_use]
    pub const fn index_range(&self) -> RangeInclusive<u32> {
        self.first_index..=self.last_index
    }

    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Buffer limits for the receive path.
    #[must_use]
    pub const fn recv_limits(&self) -> RecvLimits {
        RecvLimits {
            initial: self.recv_chunk,
            increment: self.recv_increment,
            max: self.max_message_size,
        }
    }
}

/// Sizing of the reassembly buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvLimits {
    pub initial: usize,
    pub increment: usize,
    pub max: usize,
}

impl Default for RecvLimits {
    fn default() -> Self {
        ProxyConfig::default().recv_limits()
    }
}

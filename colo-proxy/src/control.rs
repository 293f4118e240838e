//! Session lifecycle over the control channel.
//!
//! A [`Session`] is set up once per replication run: bind a free session
//! index, announce it with `ProxyInit`, then alternate checkpoint requests
//! and polls until teardown.

pub mod client;
pub mod handshake;
pub mod types;

pub use client::Session;
pub use types::{Checkpoint, SessionError, SessionState, status_code};

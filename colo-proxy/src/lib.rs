//! Client for the COLO proxy kernel module's netlink control channel.
//!
//! The proxy compares primary and secondary network output and tells the
//! replication orchestrator when the two diverge. This crate covers the
//! orchestrator's side: open the channel, request checkpoints and poll for
//! the kernel's checkpoint verdicts.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use colo_proxy::{Checkpoint, ProxyConfig, Session};
//!
//! let domain = "domain 7";
//! let mut session = Session::setup(&domain, &ProxyConfig::default())?;
//! session.preresume();
//! if session.poll_checkpoint(Duration::from_millis(100))? == Checkpoint::DoCheckpoint {
//!     // take a checkpoint
//! }
//! session.teardown();
//! # Ok::<(), colo_proxy::SessionError>(())
//! ```

pub mod config;
pub mod control;
pub mod net;
pub mod protocol;
pub mod reassembly;
pub mod trace;

pub use config::ProxyConfig;
pub use control::{Checkpoint, Session, SessionError, SessionState, status_code};
pub use net::Timeout;
pub use trace::init_tracing;

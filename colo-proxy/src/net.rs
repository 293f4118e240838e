//! Control-channel transport.
//!
//! [`Transport`] is the seam between the protocol logic and the kernel;
//! [`NetlinkSocket`] implements it over a raw `AF_NETLINK` socket.

pub mod index;
pub mod socket;
pub mod transport;

#[cfg(test)]
pub(crate) mod scripted;

pub use index::SessionIndex;
pub use socket::{NETLINK_COLO, NETLINK_USERSOCK, NetlinkSocket};
pub use transport::{Fragment, Timeout, Transport};

//! Raw netlink socket for the COLO control channel.
//!
//! A thin wrapper around a `rustix` `AF_NETLINK`/`SOCK_RAW` descriptor with
//! the bind/send/recv/timeout surface of [`Transport`].

use std::io::{self, ErrorKind, IoSliceMut};
use std::num::NonZeroU32;
use std::time::Duration;

use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::net::netlink::SocketAddrNetlink;
use rustix::net::sockopt::{self, Timeout as SockTimeout};
use rustix::net::{
    AddressFamily, Protocol, RecvAncillaryBuffer, RecvFlags, ReturnFlags, SendFlags,
    SocketFlags, SocketType,
};

use super::{SessionIndex, Timeout, Transport, transport::Fragment};

/// Netlink protocol number of the COLO proxy channel.
pub const NETLINK_COLO: u32 = 28;

/// Netlink protocol reserved for userspace; useful for exercising the socket
/// without the COLO module loaded.
pub const NETLINK_USERSOCK: u32 = 2;

/// Port id of the kernel end of every netlink channel.
const KERNEL_PORT: u32 = 0;

/// A blocking netlink datagram socket.
///
/// The descriptor is released on [`Transport::close`] or on drop.
#[derive(Debug)]
pub struct NetlinkSocket {
    fd: Option<OwnedFd>,
    protocol: u32,
}

impl NetlinkSocket {
    /// Creates an unbound socket on the given netlink protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created (missing privilege,
    /// protocol not registered by any kernel module).
    pub fn open(protocol: u32) -> io::Result<Self> {
        let fd = rustix::net::socket_with(
            AddressFamily::NETLINK,
            SocketType::RAW,
            SocketFlags::CLOEXEC,
            NonZeroU32::new(protocol).map(Protocol::from_raw),
        )?;
        Ok(Self {
            fd: Some(fd),
            protocol,
        })
    }

    /// Netlink protocol number this socket was opened with.
    #[must_use]
    pub const fn protocol(&self) -> u32 {
        self.protocol
    }

    /// Reads back the current receive timeout (`None` means blocking).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is closed or the option cannot be read.
    pub fn recv_timeout(&self) -> io::Result<Option<Duration>> {
        Ok(sockopt::socket_timeout(self.fd()?, SockTimeout::Recv)?)
    }

    fn fd(&self) -> io::Result<BorrowedFd<'_>> {
        self.fd
            .as_ref()
            .map(AsFd::as_fd)
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "control socket closed"))
    }
}

impl Transport for NetlinkSocket {
    fn bind(&mut self, index: SessionIndex) -> io::Result<()> {
        let addr = SocketAddrNetlink::new(index.as_u32(), 0);
        rustix::net::bind(self.fd()?, &addr)?;
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        let kernel = SocketAddrNetlink::new(KERNEL_PORT, 0);
        Ok(rustix::net::sendto(
            self.fd()?,
            datagram,
            SendFlags::empty(),
            &kernel,
        )?)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Fragment> {
        let mut iov = [IoSliceMut::new(buf)];
        let mut control = RecvAncillaryBuffer::default();
        let msg = rustix::net::recvmsg(self.fd()?, &mut iov, &mut control, RecvFlags::empty())?;
        Ok(Fragment {
            len: msg.bytes,
            truncated: msg.flags.contains(ReturnFlags::TRUNC),
        })
    }

    fn set_recv_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        let value = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(d),
        };
        sockopt::set_socket_timeout(self.fd()?, SockTimeout::Recv, value)?;
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the OwnedFd closes it exactly once.
        self.fd = None;
    }

    fn is_open(&self) -> bool {
        self.fd.is_some()
    }
}

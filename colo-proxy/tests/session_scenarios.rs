//! End-to-end session flows against an in-process kernel stand-in.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

use colo_proxy::net::{Fragment, SessionIndex, Timeout, Transport};
use colo_proxy::protocol::{
    CHECKPOINT_PAYLOAD_SIZE, ERROR_PAYLOAD_SIZE, HEADER_SIZE, Header, OperationCode, flags,
    msg_type,
};
use colo_proxy::{Checkpoint, ProxyConfig, Session, SessionError, SessionState, status_code};

#[derive(Debug, Default)]
struct Wire {
    taken: Vec<u32>,
    sent: Vec<Header>,
    inbox: VecDeque<(Vec<u8>, bool)>,
    timeout: Option<Duration>,
    closes: usize,
}

/// Plays the kernel module: indices in `taken` are already bound by other
/// sessions, `inbox` holds the datagrams it will deliver.
struct FakeKernel {
    wire: Rc<RefCell<Wire>>,
    open: bool,
}

impl FakeKernel {
    fn new() -> (Self, Rc<RefCell<Wire>>) {
        let wire = Rc::new(RefCell::new(Wire::default()));
        let kernel = Self {
            wire: Rc::clone(&wire),
            open: true,
        };
        (kernel, wire)
    }
}

impl Transport for FakeKernel {
    fn bind(&mut self, index: SessionIndex) -> io::Result<()> {
        if self.wire.borrow().taken.contains(&index.as_u32()) {
            return Err(ErrorKind::AddrInUse.into());
        }
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(ErrorKind::NotConnected.into());
        }
        let header = Header::decode(datagram).map_err(io::Error::other)?;
        self.wire.borrow_mut().sent.push(header);
        Ok(datagram.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Fragment> {
        let mut wire = self.wire.borrow_mut();
        let Some((bytes, split)) = wire.inbox.pop_front() else {
            return Err(ErrorKind::WouldBlock.into());
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(Fragment {
            len,
            truncated: split || bytes.len() > buf.len(),
        })
    }

    fn set_recv_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        self.wire.borrow_mut().timeout = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Some(d),
        };
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.wire.borrow_mut().closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn ack(code: i32, index: u32) -> Vec<u8> {
    let header = Header {
        len: (HEADER_SIZE + ERROR_PAYLOAD_SIZE) as u32,
        kind: msg_type::ERROR,
        flags: 0,
        seq: 0,
        index: 0,
    };
    let echoed = Header::request(
        OperationCode::ProxyInit,
        SessionIndex::new(index).unwrap(),
        true,
    );
    let mut buf = header.encode().to_vec();
    buf.extend_from_slice(&code.to_ne_bytes());
    buf.extend_from_slice(&echoed.encode());
    buf
}

fn checkpoint_event(flag: u8) -> Vec<u8> {
    let header = Header {
        len: (HEADER_SIZE + CHECKPOINT_PAYLOAD_SIZE) as u32,
        kind: OperationCode::Checkpoint.as_u16(),
        flags: 0,
        seq: 0,
        index: 0,
    };
    let mut buf = header.encode().to_vec();
    buf.push(flag);
    buf
}

fn deliver(wire: &Rc<RefCell<Wire>>, bytes: Vec<u8>) {
    wire.borrow_mut().inbox.push_back((bytes, false));
}

/// Delivers `bytes` as `size`-byte fragments, all but the last truncated.
fn deliver_in_pieces(wire: &Rc<RefCell<Wire>>, bytes: &[u8], size: usize) {
    let mut wire = wire.borrow_mut();
    let count = bytes.chunks(size).count();
    for (i, chunk) in bytes.chunks(size).enumerate() {
        wire.inbox.push_back((chunk.to_vec(), i + 1 < count));
    }
}

const DOMAIN: &str = "domain 7";

#[test]
fn setup_skips_taken_index_and_registers() {
    colo_proxy::init_tracing();
    let (kernel, wire) = FakeKernel::new();
    wire.borrow_mut().taken.push(1);
    deliver(&wire, ack(0, 2));

    let session = Session::setup_with(&DOMAIN, &ProxyConfig::default(), || Ok(kernel)).unwrap();

    assert_eq!(session.index().as_u32(), 2);
    assert_eq!(session.state(), SessionState::Ready);
    let sent = wire.borrow().sent.clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, OperationCode::ProxyInit.as_u16());
    assert_eq!(sent[0].flags, flags::REQUEST | flags::ACK);
    assert_eq!(sent[0].index, 2);
    assert_eq!(wire.borrow().timeout, None);
}

#[test]
fn checkpoint_cycle() {
    let (kernel, wire) = FakeKernel::new();
    deliver(&wire, ack(0, 1));
    let mut session =
        Session::setup_with(&DOMAIN, &ProxyConfig::default(), || Ok(kernel)).unwrap();

    session.preresume();
    session.postresume();
    let last = *wire.borrow().sent.last().unwrap();
    assert_eq!(last.kind, OperationCode::Checkpoint.as_u16());
    assert_eq!(last.flags, flags::REQUEST);
    assert_eq!(last.index, 1);

    deliver(&wire, checkpoint_event(1));
    let result = session.poll_checkpoint(Duration::from_millis(100));
    assert_eq!(status_code(&result), 1);
    assert_eq!(result.unwrap(), Checkpoint::DoCheckpoint);

    deliver(&wire, checkpoint_event(0));
    assert_eq!(
        session.poll_checkpoint(Duration::from_millis(100)).unwrap(),
        Checkpoint::NoEvent
    );

    // Silence within the timeout.
    let result = session.poll_checkpoint(Duration::from_millis(100));
    assert_eq!(status_code(&result), 0);
    assert_eq!(wire.borrow().timeout, None);
}

#[test]
fn large_event_is_reassembled() {
    let config = ProxyConfig {
        recv_chunk: 8,
        recv_increment: 8,
        ..ProxyConfig::default()
    };
    let (kernel, wire) = FakeKernel::new();
    // The ack does not fit in 8 bytes either.
    deliver_in_pieces(&wire, &ack(0, 1), 8);

    let mut session = Session::setup_with(&DOMAIN, &config, || Ok(kernel)).unwrap();

    deliver_in_pieces(&wire, &checkpoint_event(1), 8);
    assert_eq!(
        session.poll_checkpoint(Duration::from_millis(100)).unwrap(),
        Checkpoint::DoCheckpoint
    );
}

#[test]
fn rejected_registration_leaves_nothing_open() {
    let (kernel, wire) = FakeKernel::new();
    deliver(&wire, ack(-13, 1));

    let err = Session::setup_with(&DOMAIN, &ProxyConfig::default(), || Ok(kernel)).unwrap_err();

    assert!(matches!(err, SessionError::KernelReported(-13)));
    assert_eq!(wire.borrow().closes, 1);
    assert_eq!(wire.borrow().timeout, None);
}

#[test]
fn all_indices_taken() {
    let (kernel, wire) = FakeKernel::new();
    wire.borrow_mut().taken.extend(1..=10);

    let err = Session::setup_with(&DOMAIN, &ProxyConfig::default(), || Ok(kernel)).unwrap_err();

    assert!(matches!(err, SessionError::BindExhausted { tried: 10 }));
    assert!(wire.borrow().sent.is_empty());
    assert_eq!(wire.borrow().closes, 1);
}

#[test]
fn unanswered_registration_times_out() {
    let config = ProxyConfig {
        handshake_timeout_ms: 50,
        ..ProxyConfig::default()
    };
    let (kernel, wire) = FakeKernel::new();

    let err = Session::setup_with(&DOMAIN, &config, || Ok(kernel)).unwrap_err();

    assert!(matches!(err, SessionError::HandshakeTimeout(d) if d == Duration::from_millis(50)));
    assert_eq!(wire.borrow().closes, 1);
}

#[test]
fn double_teardown() {
    let (kernel, wire) = FakeKernel::new();
    deliver(&wire, ack(0, 1));
    let mut session =
        Session::setup_with(&DOMAIN, &ProxyConfig::default(), || Ok(kernel)).unwrap();

    session.teardown();
    session.teardown();

    assert_eq!(wire.borrow().closes, 1);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.try_preresume(), Err(SessionError::Closed)));
    let result = session.poll_checkpoint(Duration::from_millis(10));
    assert_eq!(status_code(&result), -1);
}

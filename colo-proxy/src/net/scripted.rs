//! In-memory transport driven by a script, for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::rc::Rc;

use super::{Fragment, SessionIndex, Timeout, Transport};

/// Everything the code under test did to the transport.
#[derive(Debug)]
pub(crate) struct Record {
    pub binds: Vec<u32>,
    pub sent: Vec<Vec<u8>>,
    pub timeouts: Vec<Timeout>,
    pub current_timeout: Timeout,
    pub closes: usize,
}

impl Default for Record {
    fn default() -> Self {
        Self {
            binds: Vec::new(),
            sent: Vec::new(),
            timeouts: Vec::new(),
            current_timeout: Timeout::Infinite,
            closes: 0,
        }
    }
}

/// One scripted result for a `recv` call.
#[derive(Debug)]
pub(crate) enum Reply {
    /// A datagram; truncated if it does not fit or if `truncated` is forced.
    Data { bytes: Vec<u8>, truncated: bool },
    Fail(ErrorKind),
}

impl Reply {
    pub fn whole(bytes: Vec<u8>) -> Self {
        Self::Data {
            bytes,
            truncated: false,
        }
    }

    pub fn truncated(bytes: Vec<u8>) -> Self {
        Self::Data {
            bytes,
            truncated: true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ScriptedTransport {
    bind_failures: VecDeque<ErrorKind>,
    send_failure: Option<ErrorKind>,
    replies: VecDeque<Reply>,
    open: bool,
    record: Rc<RefCell<Record>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            bind_failures: VecDeque::new(),
            send_failure: None,
            replies: VecDeque::new(),
            open: true,
            record: Rc::default(),
        }
    }

    /// The next `n` binds fail with `kind`, later binds succeed.
    pub fn fail_binds(mut self, n: usize, kind: ErrorKind) -> Self {
        self.bind_failures.extend(std::iter::repeat_n(kind, n));
        self
    }

    pub fn fail_sends(mut self, kind: ErrorKind) -> Self {
        self.send_failure = Some(kind);
        self
    }

    pub fn reply(mut self, reply: Reply) -> Self {
        self.replies.push_back(reply);
        self
    }

    /// Shared view of the record, still readable after the transport moves.
    pub fn record(&self) -> Rc<RefCell<Record>> {
        Rc::clone(&self.record)
    }
}

impl Transport for ScriptedTransport {
    fn bind(&mut self, index: SessionIndex) -> io::Result<()> {
        self.record.borrow_mut().binds.push(index.as_u32());
        match self.bind_failures.pop_front() {
            Some(kind) => Err(kind.into()),
            None => Ok(()),
        }
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.send_failure {
            return Err(kind.into());
        }
        self.record.borrow_mut().sent.push(datagram.to_vec());
        Ok(datagram.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Fragment> {
        match self.replies.pop_front() {
            Some(Reply::Data { bytes, truncated }) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Fragment {
                    len,
                    truncated: truncated || bytes.len() > buf.len(),
                })
            }
            Some(Reply::Fail(kind)) => Err(kind.into()),
            // An exhausted script behaves like an expired timeout.
            None => Err(ErrorKind::WouldBlock.into()),
        }
    }

    fn set_recv_timeout(&mut self, timeout: Timeout) -> io::Result<()> {
        let mut record = self.record.borrow_mut();
        record.timeouts.push(timeout);
        record.current_timeout = timeout;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.record.borrow_mut().closes += 1;
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

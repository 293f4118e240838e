//! Session index: the netlink port id a client binds to.

use std::fmt;
use std::ops::RangeInclusive;

/// First index tried when binding.
pub const FIRST_INDEX: u32 = 1;

/// Last index tried when binding.
pub const LAST_INDEX: u32 = 10;

/// A bound client address on the control channel.
///
/// Invariant: nonzero. Port id 0 belongs to the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionIndex(u32);

impl SessionIndex {
    /// Creates an index, rejecting the kernel's port id 0.
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Raw value for the wire and for `nl_pid`.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Candidates in bind order for an inclusive range, skipping 0.
    pub fn candidates(range: RangeInclusive<u32>) -> impl Iterator<Item = Self> {
        range.filter_map(Self::new)
    }
}

impl From<SessionIndex> for u32 {
    fn from(index: SessionIndex) -> Self {
        index.0
    }
}

impl fmt::Display for SessionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

//! Identity types for the netron protocol
//!
//! Peer identities are 64-bit and stable for the lifetime of a Netron
//! instance. Definition ids are 32-bit and scoped to the instance that
//! minted them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Peer identity - stable per Netron instance, exchanged during the
/// connection handshake.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    pub const ZERO: PeerId = PeerId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        PeerId(id)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        PeerId(u64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({:016x})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Definition identity - allocated monotonically by the owning Netron,
/// never reused. Zero is reserved for "no definition".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefId(pub u32);

impl DefId {
    pub const NONE: DefId = DefId(0);

    #[inline]
    pub fn new(id: u32) -> Self {
        DefId(id)
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Def({})", self.0)
    }
}

impl fmt::Display for DefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

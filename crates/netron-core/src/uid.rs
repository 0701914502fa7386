//! Monotonic id allocation scoped to a single Netron instance.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::DefId;

/// Allocates monotonically increasing, never-reused 32-bit ids.
///
/// Ids start at 1; zero is reserved for [`DefId::NONE`]. The counter is
/// scoped to the owning Netron instance, so ids from different instances
/// are unrelated.
#[derive(Debug)]
pub struct UidSequence {
    next: AtomicU32,
}

impl UidSequence {
    pub fn new() -> Self {
        UidSequence {
            next: AtomicU32::new(1),
        }
    }

    /// Next raw id.
    #[inline]
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Next definition id.
    #[inline]
    pub fn next_def(&self) -> DefId {
        DefId(self.next())
    }
}

impl Default for UidSequence {
    fn default() -> Self {
        Self::new()
    }
}

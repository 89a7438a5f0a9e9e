//! ## cheap-core::alloc::stats
//! **Arena usage snapshots**
//!
//! An [`ArenaUsage`] is a point-in-time copy of a cursor arena's accounting,
//! taken with [`CursorArena::usage`](crate::CursorArena::usage). It is plain
//! data so it can be logged, serialised, or fed to a metrics recorder.

use serde::{Deserialize, Serialize};

/// Usage accounting for a cursor arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaUsage {
    /// Total usable bytes.
    pub capacity: usize,
    /// Bytes handed out, including alignment padding.
    pub used: usize,
    /// Bytes still available.
    pub available: usize,
    /// Bytes below the page-aligned committed boundary.
    pub committed: usize,
    /// Default allocation alignment.
    pub alignment: usize,
}

impl ArenaUsage {
    /// Fraction of the capacity in use, from 0.0 to 1.0.
    pub fn utilisation(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used as f64 / self.capacity as f64
    }
}

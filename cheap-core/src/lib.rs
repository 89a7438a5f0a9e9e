//! # cheap-core
//!
//! Cursor heap ("cheap") arena allocator for the working structures of a
//! storage engine.
//!
//! A cursor arena serves aligned allocations out of one pre-acquired region by
//! advancing a cursor. Only the most recent allocation can be given back.
//!
//! ### Key Submodules:
//! - `alloc`: the cursor arena, its backing regions and usage snapshots
//! - `dax`: device size discovery for persistent-memory (DAX) devices
//! - `exercise`: fill/verify/zero routines that stress an arena
//!
//! The arena has no internal synchronisation. Mutating calls take `&mut self`;
//! callers that share an arena across threads must wrap it in their own lock.

pub mod alloc;
pub mod dax;
pub mod error;
pub mod exercise;

pub mod prelude {
    pub use crate::alloc::*;
    pub use crate::dax::{DeviceSizeProbe, SysfsProbe};
    pub use crate::error::*;
}

pub use alloc::{ArenaUsage, CursorArena};
pub use error::{ArenaError, ProbeError};

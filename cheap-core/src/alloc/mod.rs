//! ## cheap-core::alloc
//! **Cursor arena and its backing regions**
//!
//! ### Key Submodules:
//! - `backing/`: anonymous and device-backed memory mappings
//! - `arena/`: the cursor arena allocator
//! - `stats/`: usage snapshots

pub mod arena;
pub mod backing;
pub mod stats;

pub use arena::CursorArena;
pub use backing::Backing;
pub use stats::ArenaUsage;

/// Cache line size the arena base is rounded up to.
pub const CACHE_LINE_SIZE: usize = 64;

/// Largest permitted default alignment.
pub const MAX_DEFAULT_ALIGNMENT: usize = 64;

/// Anonymous regions are over-allocated to a multiple of this size (2 MiB).
pub const REGION_GRANULE: usize = 2 << 20;

/// Page size used for the committed boundary.
pub const PAGE_SIZE: usize = 4096;

/// Rounds `value` up to the power-of-two boundary `align`.
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

/// Rounds `value` down to the power-of-two boundary `align`.
#[inline]
pub(crate) const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

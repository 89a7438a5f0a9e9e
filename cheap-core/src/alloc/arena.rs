//! ## cheap-core::alloc::arena
//! **Cursor arena allocator**
//!
//! A cursor arena hands out aligned sub-ranges of a single [`Region`] by
//! advancing a cursor. Allocations are never reclaimed individually, except
//! that the single most recent allocation can be rolled back. This lets a
//! caller reserve space ahead of an operation that may fail and give it back
//! if it does.
//!
//! ```text
//! start  base                        cursor                     base + size
//!   |pad |  alloc  |pad|  alloc  |     |        available             |
//! ```

use std::alloc::Layout;
use std::path::Path;
use std::ptr::NonNull;

use tracing::{debug, trace};

use super::backing::{Backing, Region};
use super::stats::ArenaUsage;
use super::{align_down, align_up, CACHE_LINE_SIZE, MAX_DEFAULT_ALIGNMENT, PAGE_SIZE};
use crate::dax::{DeviceSizeProbe, SysfsProbe};
use crate::error::ArenaError;

const TAG_SALT: u64 = 0x6368_6561_7021_c0de;

/// Bump allocator over a single memory region.
///
/// Not thread-safe: every mutating call takes `&mut self`, and sharing an
/// arena between threads requires an external lock.
#[derive(Debug)]
pub struct CursorArena {
    region: Region,
    base: usize,
    size: usize,
    cursor: usize,
    last: Option<usize>,
    alignment: usize,
    brk: usize,
    tag: u64,
}

impl CursorArena {
    /// Creates an arena over a zero-filled anonymous mapping.
    ///
    /// `size` is rounded up to a multiple of 2 MiB. `alignment` becomes the
    /// default for [`alloc`](Self::alloc); values below 2 mean byte alignment.
    pub fn anonymous(alignment: usize, size: usize) -> Result<Self, ArenaError> {
        let alignment = normalize_default_alignment(alignment)?;
        Self::with_alignment(Region::anonymous(size)?, alignment)
    }

    /// Creates an arena over an entire DAX device, probing its size via sysfs.
    pub fn device(path: impl AsRef<Path>, alignment: usize) -> Result<Self, ArenaError> {
        Self::device_with_probe(path, alignment, &SysfsProbe::default())
    }

    /// Creates an arena over an entire device whose size is reported by `probe`.
    pub fn device_with_probe<P>(
        path: impl AsRef<Path>,
        alignment: usize,
        probe: &P,
    ) -> Result<Self, ArenaError>
    where
        P: DeviceSizeProbe + ?Sized,
    {
        let alignment = normalize_default_alignment(alignment)?;
        Self::with_alignment(Region::device(path, probe)?, alignment)
    }

    /// Creates an arena over an already acquired region.
    ///
    /// Fails with [`ArenaError::RegionTooSmall`] when the region ends before
    /// its first cache-line boundary.
    pub fn from_region(region: Region, alignment: usize) -> Result<Self, ArenaError> {
        let alignment = normalize_default_alignment(alignment)?;
        Self::with_alignment(region, alignment)
    }

    /// Creates an arena over memory the arena does not own.
    ///
    /// # Safety
    ///
    /// See [`Region::external`].
    pub unsafe fn from_raw_parts(
        start: NonNull<u8>,
        len: usize,
        alignment: usize,
    ) -> Result<Self, ArenaError> {
        Self::from_region(Region::external(start, len), alignment)
    }

    fn with_alignment(region: Region, alignment: usize) -> Result<Self, ArenaError> {
        let start = region.start().as_ptr() as usize;
        let base = align_up(start, CACHE_LINE_SIZE);
        let pad = base - start;
        let size = region
            .len()
            .checked_sub(pad)
            .ok_or(ArenaError::RegionTooSmall {
                len: region.len(),
                pad,
            })?;

        debug!(
            base = format_args!("{base:#x}"),
            size,
            alignment,
            backing = ?region.backing(),
            "created cursor arena"
        );

        Ok(Self {
            region,
            base,
            size,
            cursor: base,
            last: None,
            alignment,
            brk: align_up(base, PAGE_SIZE),
            tag: identity_tag(base),
        })
    }

    /// Allocates `size` bytes at the default alignment.
    ///
    /// A zero-byte allocation moves the cursor only past the alignment
    /// padding, so the returned address equals the new cursor. It is still
    /// the address [`rollback`](Self::rollback) accepts.
    pub fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, ArenaError> {
        self.check_live();
        self.bump(self.alignment, size)
    }

    /// Allocates `size` bytes at `alignment`, which overrides the default even
    /// when it is smaller.
    pub fn alloc_aligned(&mut self, alignment: usize, size: usize) -> Result<NonNull<u8>, ArenaError> {
        self.check_live();
        if !alignment.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment { alignment });
        }
        self.bump(alignment, size)
    }

    /// Allocates space for `layout`.
    pub fn alloc_layout(&mut self, layout: Layout) -> Result<NonNull<u8>, ArenaError> {
        self.alloc_aligned(layout.align(), layout.size())
    }

    /// Same as [`alloc`](Self::alloc), zero-filling the allocation.
    pub fn alloc_zeroed(&mut self, size: usize) -> Result<NonNull<u8>, ArenaError> {
        let ptr = self.alloc(size)?;
        // SAFETY: `ptr..ptr + size` was just carved out of the region.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(ptr)
    }

    /// Same as [`alloc_aligned`](Self::alloc_aligned), zero-filling the allocation.
    pub fn alloc_aligned_zeroed(
        &mut self,
        alignment: usize,
        size: usize,
    ) -> Result<NonNull<u8>, ArenaError> {
        let ptr = self.alloc_aligned(alignment, size)?;
        // SAFETY: `ptr..ptr + size` was just carved out of the region.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(ptr)
    }

    fn bump(&mut self, alignment: usize, size: usize) -> Result<NonNull<u8>, ArenaError> {
        let candidate = self
            .cursor
            .checked_add(alignment - 1)
            .map(|padded| padded & !(alignment - 1));

        let candidate = match candidate {
            Some(candidate) if size <= self.size && candidate - self.base <= self.size - size => {
                candidate
            }
            _ => {
                let available = self.available_unchecked();
                trace!(requested = size, alignment, available, "cursor arena exhausted");
                return Err(ArenaError::OutOfArenaSpace {
                    requested: size,
                    available,
                });
            }
        };

        self.last = Some(candidate);
        self.cursor = candidate + size;

        let offset = candidate - self.region.start().as_ptr() as usize;
        // SAFETY: the start pointer is non-null and the offset stays within
        // the region, or one past its end for a zero-sized request.
        Ok(unsafe { NonNull::new_unchecked(self.region.start().as_ptr().wrapping_add(offset)) })
    }

    /// Rolls back the most recent allocation.
    ///
    /// Does nothing unless `ptr` is exactly the address returned by the last
    /// allocation still eligible for rollback. Earlier allocations can never
    /// be freed.
    pub fn rollback<T: ?Sized>(&mut self, ptr: *const T) {
        self.check_live();

        let addr = ptr.cast::<u8>() as usize;
        let Some(last) = self.last.filter(|last| *last == addr) else {
            return;
        };

        if self.brk < self.cursor {
            self.brk = align_up(self.cursor, PAGE_SIZE);
        }
        self.cursor = last;
        self.last = None;
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.check_live();
        self.used_unchecked()
    }

    /// Bytes still available for allocation.
    pub fn available(&self) -> usize {
        self.check_live();
        self.available_unchecked()
    }

    pub fn usage(&self) -> ArenaUsage {
        self.check_live();
        ArenaUsage {
            capacity: self.size,
            used: self.used_unchecked(),
            available: self.available_unchecked(),
            committed: self.brk - align_down(self.base, PAGE_SIZE),
            alignment: self.alignment,
        }
    }

    /// Total usable capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Default alignment applied by [`alloc`](Self::alloc).
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// First usable byte of the arena.
    pub fn base(&self) -> NonNull<u8> {
        let offset = self.base - self.region.start().as_ptr() as usize;
        // SAFETY: `base` is at most one cache line past a non-null start.
        unsafe { NonNull::new_unchecked(self.region.start().as_ptr().wrapping_add(offset)) }
    }

    /// Page-aligned high-water mark of touched bytes, as an address.
    pub fn committed_boundary(&self) -> usize {
        self.brk
    }

    /// Address of the allocation a [`rollback`](Self::rollback) would undo.
    pub fn last_allocation(&self) -> Option<usize> {
        self.last
    }

    pub fn backing(&self) -> &Backing {
        self.region.backing()
    }

    /// Releases the backing region and any device descriptor.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.check_live();
        std::mem::replace(&mut self.region.backing, Backing::External).release();
        self.tag = !self.tag;
        debug!(base = format_args!("{:#x}", self.base), "destroyed cursor arena");
    }

    fn used_unchecked(&self) -> usize {
        (self.cursor - self.base).min(self.size)
    }

    fn available_unchecked(&self) -> usize {
        self.size - self.used_unchecked()
    }

    fn is_live(&self) -> bool {
        self.tag == identity_tag(self.base)
    }

    fn is_released(&self) -> bool {
        self.tag == !identity_tag(self.base)
    }

    #[inline]
    fn check_live(&self) {
        if !self.is_live() {
            panic!(
                "cursor arena at {:#x} is destroyed or corrupted (tag {:#x})",
                self.base, self.tag
            );
        }
    }
}

impl Drop for CursorArena {
    fn drop(&mut self) {
        if self.is_live() {
            self.release();
        } else if !self.is_released() && !std::thread::panicking() {
            panic!("dropping corrupted cursor arena at {:#x}", self.base);
        }
    }
}

fn identity_tag(base: usize) -> u64 {
    base as u64 ^ TAG_SALT
}

fn normalize_default_alignment(alignment: usize) -> Result<usize, ArenaError> {
    match alignment {
        0 | 1 => Ok(1),
        a if a > MAX_DEFAULT_ALIGNMENT || !a.is_power_of_two() => {
            Err(ArenaError::InvalidAlignment { alignment })
        }
        a => Ok(a),
    }
}

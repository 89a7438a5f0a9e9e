//! ## cheap-core::alloc::backing
//! **Memory regions a cursor arena carves allocations from**
//!
//! A [`Region`] pairs the start and length of a contiguous range with a
//! [`Backing`] recording who owns it. Device regions are `memmap2` mappings
//! and anonymous regions are shared `mmap` mappings made through `libc`;
//! dropping the backing unmaps them and closes any device descriptor.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use super::{align_up, REGION_GRANULE};
use crate::dax::DeviceSizeProbe;
use crate::error::{ArenaError, ProbeError};

/// Zero-filled `MAP_SHARED | MAP_ANONYMOUS` mapping, unmapped on drop.
pub struct AnonymousMap {
    ptr: NonNull<u8>,
    len: usize,
}

impl AnonymousMap {
    fn new(len: usize) -> io::Result<Self> {
        // SAFETY: a fresh anonymous mapping at a kernel-chosen address
        // aliases no existing memory.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("anonymous mapping returned a null address"))?;
        Ok(Self { ptr, len })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for AnonymousMap {
    fn drop(&mut self) {
        // SAFETY: `ptr..ptr + len` is exactly the mapping made in `new`, and
        // nothing else unmaps it.
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } != 0 {
            warn!(len = self.len, error = %io::Error::last_os_error(), "munmap failed");
        }
    }
}

/// Ownership record for the memory behind an arena.
pub enum Backing {
    /// Zero-filled shared anonymous mapping owned by the arena.
    Anonymous(AnonymousMap),
    /// Shared mapping of an entire device, plus the open device descriptor.
    Device {
        map: MmapMut,
        file: File,
        path: PathBuf,
    },
    /// Memory supplied by the caller. Nothing is released on destruction.
    External,
}

impl Backing {
    /// Whether destroying the arena must release this memory.
    pub fn is_owned(&self) -> bool {
        !matches!(self, Backing::External)
    }

    /// Releases exactly the resources acquired for this backing.
    pub(crate) fn release(self) {
        match self {
            Backing::Anonymous(map) => {
                debug!(len = map.len(), "unmapping anonymous arena region");
                drop(map);
            }
            Backing::Device { map, file, path } => {
                debug!(len = map.len(), device = %path.display(), "unmapping device arena region");
                drop(map);
                drop(file);
            }
            Backing::External => {}
        }
    }
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Anonymous(map) => f.debug_tuple("Anonymous").field(&map.len()).finish(),
            Backing::Device { map, path, .. } => f
                .debug_struct("Device")
                .field("len", &map.len())
                .field("path", path)
                .finish(),
            Backing::External => f.write_str("External"),
        }
    }
}

/// A contiguous byte range and the record of who owns it.
#[derive(Debug)]
pub struct Region {
    start: NonNull<u8>,
    len: usize,
    pub(crate) backing: Backing,
}

// SAFETY: a region is the sole handle to its memory, and moving it to
// another thread moves that exclusive access with it.
unsafe impl Send for Region {}

impl Region {
    /// Maps a zero-filled anonymous region of at least `requested` bytes.
    ///
    /// The length is rounded up to the next multiple of 2 MiB; a request of
    /// zero bytes still yields one 2 MiB granule.
    pub fn anonymous(requested: usize) -> Result<Self, ArenaError> {
        let len = requested
            .max(1)
            .checked_add(REGION_GRANULE - 1)
            .map(|padded| padded & !(REGION_GRANULE - 1))
            .ok_or_else(|| ArenaError::BackingAllocation {
                size: requested,
                source: io::Error::other("requested size overflows the 2 MiB granule"),
            })?;
        debug_assert_eq!(len, align_up(requested.max(1), REGION_GRANULE));

        let map = AnonymousMap::new(len)
            .map_err(|source| ArenaError::BackingAllocation { size: len, source })?;
        let start = map.ptr;

        debug!(requested, len, "mapped anonymous arena region");
        Ok(Self {
            start,
            len,
            backing: Backing::Anonymous(map),
        })
    }

    /// Maps the whole of a persistent-memory device.
    ///
    /// The device size comes from `probe` and is used as-is, without rounding.
    pub fn device<P>(path: impl AsRef<Path>, probe: &P) -> Result<Self, ArenaError>
    where
        P: DeviceSizeProbe + ?Sized,
    {
        let path = path.as_ref();

        let size = probe
            .device_size(path)
            .and_then(|size| {
                if size == 0 {
                    Err(ProbeError::EmptyDevice {
                        path: path.to_path_buf(),
                    })
                } else {
                    Ok(size)
                }
            })
            .map_err(|source| ArenaError::DeviceSizeUnavailable {
                path: path.to_path_buf(),
                source,
            })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| ArenaError::DeviceOpen {
                path: path.to_path_buf(),
                source,
            })?;

        let len = usize::try_from(size).map_err(|_| ArenaError::Mapping {
            path: path.to_path_buf(),
            size: usize::MAX,
            source: io::Error::other(format!("device size {size} exceeds the address space")),
        })?;

        // SAFETY: the device stays open for as long as the map lives (both are
        // held by the same `Backing::Device`), and the arena is the only user
        // of the mapping.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file) }.map_err(|source| {
            ArenaError::Mapping {
                path: path.to_path_buf(),
                size: len,
                source,
            }
        })?;

        let start = NonNull::new(map.as_mut_ptr()).ok_or_else(|| ArenaError::Mapping {
            path: path.to_path_buf(),
            size: len,
            source: io::Error::other("device mapping returned a null address"),
        })?;

        debug!(device = %path.display(), len, "mapped device arena region");
        Ok(Self {
            start,
            len,
            backing: Backing::Device {
                map,
                file,
                path: path.to_path_buf(),
            },
        })
    }

    /// Wraps memory the arena does not own.
    ///
    /// # Safety
    ///
    /// `start..start + len` must be valid for reads and writes, and must stay
    /// valid and otherwise unused for the lifetime of the arena built on it.
    pub unsafe fn external(start: NonNull<u8>, len: usize) -> Self {
        Self {
            start,
            len,
            backing: Backing::External,
        }
    }

    pub fn start(&self) -> NonNull<u8> {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::PAGE_SIZE;

    struct FixedProbe(u64);

    impl DeviceSizeProbe for FixedProbe {
        fn device_size(&self, _path: &Path) -> Result<u64, ProbeError> {
            Ok(self.0)
        }
    }

    #[test]
    fn anonymous_region_rounds_to_granule() {
        let region = Region::anonymous(1).unwrap();
        assert_eq!(region.len(), REGION_GRANULE);
        assert!(region.backing().is_owned());

        let region = Region::anonymous(REGION_GRANULE + 1).unwrap();
        assert_eq!(region.len(), 2 * REGION_GRANULE);
    }

    #[test]
    fn anonymous_region_of_zero_bytes_is_one_granule() {
        let region = Region::anonymous(0).unwrap();
        assert_eq!(region.len(), REGION_GRANULE);
    }

    #[test]
    fn anonymous_region_is_page_aligned_and_zeroed() {
        let region = Region::anonymous(PAGE_SIZE).unwrap();
        assert_eq!(region.start().as_ptr() as usize % PAGE_SIZE, 0);
        let bytes = unsafe { std::slice::from_raw_parts(region.start().as_ptr(), region.len()) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn anonymous_region_is_shared_mapping() {
        let region = Region::anonymous(1).unwrap();
        let prefix = format!("{:x}-", region.start().as_ptr() as usize);

        let maps = std::fs::read_to_string("/proc/self/maps").unwrap();
        let line = maps.lines().find(|line| line.starts_with(&prefix)).unwrap();
        let perms = line.split_whitespace().nth(1).unwrap();
        assert_eq!(perms, "rw-s");
    }

    #[test]
    fn anonymous_region_overflow_is_reported() {
        let err = Region::anonymous(usize::MAX).unwrap_err();
        assert!(matches!(err, ArenaError::BackingAllocation { .. }));
    }

    #[test]
    fn device_region_maps_probed_size_without_rounding() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(3 * PAGE_SIZE as u64).unwrap();

        let region = Region::device(file.path(), &FixedProbe(3 * PAGE_SIZE as u64)).unwrap();
        assert_eq!(region.len(), 3 * PAGE_SIZE);
        assert!(matches!(region.backing(), Backing::Device { .. }));
    }

    #[test]
    fn device_region_rejects_zero_size() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = Region::device(file.path(), &FixedProbe(0)).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::DeviceSizeUnavailable {
                source: ProbeError::EmptyDevice { .. },
                ..
            }
        ));
    }

    #[test]
    fn device_region_reports_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("dax0.0");
        let err = Region::device(&missing, &FixedProbe(PAGE_SIZE as u64)).unwrap_err();
        assert!(matches!(err, ArenaError::DeviceOpen { .. }));
    }

    #[test]
    fn device_region_reports_mapping_failure() {
        // `/dev/null` opens read/write but does not support mmap.
        let err = Region::device("/dev/null", &FixedProbe(PAGE_SIZE as u64)).unwrap_err();
        match err {
            ArenaError::Mapping { path, size, .. } => {
                assert_eq!(path, PathBuf::from("/dev/null"));
                assert_eq!(size, PAGE_SIZE);
            }
            other => panic!("expected a mapping error, got {other:?}"),
        }
    }

    #[test]
    fn external_region_is_not_owned() {
        let mut buf = vec![0u8; 128];
        let region = unsafe { Region::external(NonNull::new(buf.as_mut_ptr()).unwrap(), buf.len()) };
        assert!(!region.backing().is_owned());
        assert_eq!(region.len(), 128);
    }
}

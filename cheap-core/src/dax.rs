//! ## cheap-core::dax
//! **Device size discovery for DAX character devices**
//!
//! A DAX device cannot report its size through `stat`; the kernel publishes
//! it under `/sys/dev/char/<major>:<minor>/size` instead. [`SysfsProbe`]
//! resolves a device path to that entry.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ProbeError;

/// Default location of the per-device character sysfs tree.
pub const SYSFS_CHAR_ROOT: &str = "/sys/dev/char";

/// Reports the byte size of a memory device.
pub trait DeviceSizeProbe {
    fn device_size(&self, path: &Path) -> Result<u64, ProbeError>;
}

/// Reads device sizes from sysfs.
#[derive(Debug, Clone)]
pub struct SysfsProbe {
    root: PathBuf,
}

impl Default for SysfsProbe {
    fn default() -> Self {
        Self::with_root(SYSFS_CHAR_ROOT)
    }
}

impl SysfsProbe {
    /// Probe against an alternate sysfs character-device root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn device_dir(&self, rdev: u64) -> PathBuf {
        #[allow(unused_unsafe)]
        let (major, minor) = unsafe {
            (
                libc::major(rdev as libc::dev_t),
                libc::minor(rdev as libc::dev_t),
            )
        };
        self.root.join(format!("{major}:{minor}"))
    }
}

impl DeviceSizeProbe for SysfsProbe {
    fn device_size(&self, path: &Path) -> Result<u64, ProbeError> {
        let metadata = fs::metadata(path).map_err(|source| ProbeError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        let dir = self.device_dir(metadata.rdev());

        let subsystem = dir.join("subsystem");
        let resolved = fs::canonicalize(&subsystem).map_err(|source| ProbeError::Subsystem {
            path: subsystem.clone(),
            source,
        })?;

        // Non-DAX devices are tolerated; mapping them is the caller's call.
        if resolved.file_name().and_then(|name| name.to_str()) != Some("dax") {
            warn!(
                device = %path.display(),
                subsystem = %resolved.display(),
                "device is not a DAX device"
            );
        }

        let size_path = dir.join("size");
        let raw = fs::read_to_string(&size_path).map_err(|source| ProbeError::SizeRead {
            path: size_path.clone(),
            source,
        })?;

        let size = raw.trim().parse::<u64>().map_err(|_| ProbeError::SizeParse {
            path: size_path,
            value: raw.trim().to_string(),
        })?;

        debug!(device = %path.display(), size, "probed device size");
        Ok(size)
    }
}

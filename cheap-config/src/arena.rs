//! Arena construction parameters.
//!
//! Selects the backing store for the cursor arena and its default
//! allocation alignment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Largest anonymous arena that may be requested (1 TiB).
pub const MAX_ARENA_SIZE: u64 = 1 << 40;

/// Where the arena's memory comes from.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackingKind {
    /// Anonymous zero-filled mapping of `size` bytes.
    #[default]
    Anonymous,
    /// The whole of the DAX device at `device_path`.
    Device,
}

/// Cursor arena configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ArenaConfig {
    #[serde(default)]
    pub backing: BackingKind,

    /// Requested size in bytes for anonymous arenas (rounded up to 2 MiB).
    #[serde(default = "default_size")]
    #[validate(range(min = 1, max = 1_099_511_627_776u64))]
    pub size: u64,

    /// Default allocation alignment; 0 and 1 both mean byte alignment.
    #[serde(default = "default_alignment")]
    #[validate(range(max = 64))]
    pub alignment: usize,

    /// DAX device to map when `backing` is `device`.
    #[serde(default)]
    pub device_path: Option<PathBuf>,

    /// Root of the sysfs character-device tree used to size devices.
    #[serde(default = "default_sysfs_root")]
    #[validate(custom(function = validation::validate_absolute_path))]
    pub sysfs_root: PathBuf,
}

fn default_size() -> u64 {
    64 << 20
}

fn default_alignment() -> usize {
    8
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/dev/char")
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            backing: BackingKind::default(),
            size: default_size(),
            alignment: default_alignment(),
            device_path: None,
            sysfs_root: default_sysfs_root(),
        }
    }
}

impl ArenaConfig {
    /// Checks constraints that span several fields.
    pub fn check(&self) -> Result<(), String> {
        validation::check_alignment(self.alignment)?;
        if self.backing == BackingKind::Device && self.device_path.is_none() {
            return Err("arena.device_path is required when arena.backing is `device`".into());
        }
        Ok(())
    }
}

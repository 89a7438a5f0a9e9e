use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or allocating from a cursor arena.
///
/// Validity-tag mismatches are not represented here: they indicate a caller
/// bug and panic instead of returning.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("Invalid alignment {alignment} (must be a power of two, at most 64 for a default)")]
    InvalidAlignment { alignment: usize },

    #[error("Not enough arena space to allocate {requested} bytes, only {available} bytes available")]
    OutOfArenaSpace { requested: usize, available: usize },

    #[error("Region of {len} bytes is shorter than its {pad}-byte cache-line pad")]
    RegionTooSmall { len: usize, pad: usize },

    #[error("Failed to map {size} bytes of anonymous memory: {source}")]
    BackingAllocation {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to determine the size of device {path}: {source}")]
    DeviceSizeUnavailable {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },

    #[error("Failed to open memory device {path}: {source}")]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to map {size} bytes of device {path}: {source}")]
    Mapping {
        path: PathBuf,
        size: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by a [`DeviceSizeProbe`](crate::dax::DeviceSizeProbe).
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve device subsystem {path}: {source}")]
    Subsystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read device size from {path}: {source}")]
    SizeRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed device size {value:?} in {path}")]
    SizeParse { path: PathBuf, value: String },

    #[error("Device {path} reports a size of zero bytes")]
    EmptyDevice { path: PathBuf },
}

/// Failures detected by the [`exercise`](crate::exercise) routines.
#[derive(Debug, Error)]
pub enum ExerciseError {
    #[error("Invalid size range {min}..={max}")]
    InvalidRange { min: usize, max: usize },

    #[error("Allocation at {addr:#x} is not aligned to {alignment}")]
    Misaligned { addr: usize, alignment: usize },

    #[error("Allocation at {addr:#x} overlaps the previous one ending at {previous_end:#x}")]
    Overlap { addr: usize, previous_end: usize },

    #[error("Accounting drift: used {used} + available {available} != capacity {capacity}")]
    Accounting {
        used: usize,
        available: usize,
        capacity: usize,
    },

    #[error("Block {index} at {addr:#x} lost its pattern")]
    Corrupted { index: usize, addr: usize },

    #[error("Zeroed allocation at {addr:#x} holds non-zero data")]
    NotZeroed { addr: usize },

    #[error("Rollback did not return {expected:#x}, next allocation landed at {actual:#x}")]
    RollbackMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Arena(#[from] ArenaError),
}

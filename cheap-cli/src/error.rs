use cheap_config::ConfigError;
use cheap_core::error::{ArenaError, ExerciseError, ProbeError};
use cheap_telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Exercise failed: {0}")]
    Exercise(#[from] ExerciseError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Failed to render report: {0}")]
    Report(#[from] serde_yaml::Error),

    #[error("Arena size {0} does not fit in the address space")]
    SizeOverflow(u64),
}

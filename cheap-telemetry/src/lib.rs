//! # cheap Telemetry
//!
//! Logging and metrics for cursor arenas.

pub mod logging;
pub mod metrics;

pub use logging::{ArenaLogger, TelemetryError};
pub use metrics::MetricsRecorder;

//! ## cheap-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! Installs a `tracing_subscriber` formatter filtered by `RUST_LOG`, falling
//! back to the configured level.

use cheap_core::ArenaUsage;
use thiserror::Error;
use tracing::info_span;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter {filter:?}: {cause}")]
    Filter { filter: String, cause: String },

    #[error("Failed to install the global subscriber: {0}")]
    Install(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Clone)]
pub struct ArenaLogger;

impl ArenaLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
    pub fn init(default_level: &str) -> Result<(), TelemetryError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(default_level).map_err(|e| TelemetryError::Filter {
                filter: default_level.to_string(),
                cause: e.to_string(),
            })?,
        };

        fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .map_err(|e| TelemetryError::Install(e.to_string()))
    }

    /// Logs an arena usage snapshot under a `cheap_arena` span.
    pub fn log_usage(label: &str, usage: &ArenaUsage) {
        let span = info_span!("cheap_arena", arena = label);
        let _entered = span.enter();
        tracing::info!(
            capacity = usage.capacity,
            used = usage.used,
            available = usage.available,
            committed = usage.committed,
            alignment = usage.alignment,
            "Arena usage"
        );
    }
}

//! ## cheap-telemetry::metrics
//! **Prometheus metrics for cursor arenas**

use cheap_core::exercise::ExerciseOutcome;
use cheap_core::ArenaUsage;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use crate::logging::TelemetryError;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub capacity_bytes: IntGauge,
    pub used_bytes: IntGauge,
    pub committed_bytes: IntGauge,
    pub allocations: IntCounter,
    pub allocation_failures: IntCounter,
    pub rollbacks: IntCounter,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let capacity_bytes =
            IntGauge::new("cheap_arena_capacity_bytes", "Usable arena capacity in bytes")?;
        let used_bytes = IntGauge::new(
            "cheap_arena_used_bytes",
            "Bytes handed out, including alignment padding",
        )?;
        let committed_bytes = IntGauge::new(
            "cheap_arena_committed_bytes",
            "Bytes below the page-aligned committed boundary",
        )?;
        let allocations = IntCounter::new("cheap_allocations_total", "Successful allocations")?;
        let allocation_failures =
            IntCounter::new("cheap_allocation_failures_total", "Failed allocations")?;
        let rollbacks = IntCounter::new("cheap_rollbacks_total", "Rolled back allocations")?;

        registry.register(Box::new(capacity_bytes.clone()))?;
        registry.register(Box::new(used_bytes.clone()))?;
        registry.register(Box::new(committed_bytes.clone()))?;
        registry.register(Box::new(allocations.clone()))?;
        registry.register(Box::new(allocation_failures.clone()))?;
        registry.register(Box::new(rollbacks.clone()))?;

        Ok(Self {
            registry,
            capacity_bytes,
            used_bytes,
            committed_bytes,
            allocations,
            allocation_failures,
            rollbacks,
        })
    }

    /// Updates the gauges from a usage snapshot.
    pub fn observe(&self, usage: &ArenaUsage) {
        self.capacity_bytes.set(saturating_i64(usage.capacity));
        self.used_bytes.set(saturating_i64(usage.used));
        self.committed_bytes.set(saturating_i64(usage.committed));
    }

    pub fn record_allocations(&self, count: usize) {
        self.allocations.inc_by(count as u64);
    }

    pub fn record_allocation_failures(&self, count: usize) {
        self.allocation_failures.inc_by(count as u64);
    }

    pub fn record_rollbacks(&self, count: usize) {
        self.rollbacks.inc_by(count as u64);
    }

    /// Adds the counters reported by one exercise routine.
    pub fn record_outcome(&self, outcome: &ExerciseOutcome) {
        self.record_allocations(outcome.allocations);
        self.record_allocation_failures(outcome.failures);
        self.record_rollbacks(outcome.rollbacks);
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn saturating_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

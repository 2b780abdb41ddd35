//! # Metrics Collection
//!
//! Rotation step counters and timings through the `metrics` facade. No
//! exporter is installed here; without a recorder the calls are no-ops.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::sync::Once;
use std::time::Duration;

static DESCRIBE: Once = Once::new();

/// Metrics recorder for rotation steps
#[derive(Debug, Clone, Default)]
pub struct StepMetrics;

impl StepMetrics {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        DESCRIBE.call_once(describe_metrics);
        Self
    }

    /// Record one step invocation and how long it took.
    ///
    /// `outcome` is `completed`, `already_complete` or an error kind code.
    pub fn record_step(&self, step: &str, outcome: &str, duration: Duration) {
        let labels = [("step", step.to_string()), ("outcome", outcome.to_string())];
        counter!("rotation_steps_total", &labels).increment(1);

        let duration_labels = [("step", step.to_string())];
        histogram!("rotation_step_duration_seconds", &duration_labels)
            .record(duration.as_secs_f64());
    }
}

fn describe_metrics() {
    describe_counter!(
        "rotation_steps_total",
        Unit::Count,
        "Rotation step invocations by step and outcome"
    );
    describe_histogram!(
        "rotation_step_duration_seconds",
        Unit::Seconds,
        "Wall time of a rotation step"
    );
}

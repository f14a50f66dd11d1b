//! Sample producers driven by the collection timer.

use crate::core::MetricSample;
use std::time::Instant;

/// An opaque producer of named samples. Each collection tick asks every
/// registered source for its current readings.
pub trait SampleSource: Send + Sync {
    /// Source name for logs.
    fn name(&self) -> &'static str;

    /// Current readings. Called once per collection tick.
    fn collect(&self) -> Vec<MetricSample>;
}

/// Built-in source with the pipeline's own vitals: a `PollCount` counter
/// that advances by one per tick, a fresh `RandomValue` gauge, and process
/// uptime.
#[derive(Debug)]
pub struct RuntimeSource {
    started: Instant,
}

impl RuntimeSource {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for RuntimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for RuntimeSource {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn collect(&self) -> Vec<MetricSample> {
        vec![
            MetricSample::counter("PollCount", 1),
            MetricSample::gauge("RandomValue", fastrand::f64()),
            MetricSample::gauge("UptimeSeconds", self.started.elapsed().as_secs_f64()),
        ]
    }
}

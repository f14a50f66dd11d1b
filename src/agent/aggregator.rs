//! Agent-side table of the latest known value per metric.

use crate::core::{Batch, MetricKey, MetricKind, MetricSample, MetricValue};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Holds what the collection ticks produced since the process started.
///
/// The table is guarded by one lock so a snapshot is always a consistent
/// point-in-time copy; writers never interleave with a snapshot read.
/// Counters accumulate across reporting cycles and are never reset by a
/// snapshot: they are cumulative totals, not per-interval ones, so a
/// dropped reporting cycle loses nothing.
#[derive(Debug, Default)]
pub struct Aggregator {
    table: RwLock<HashMap<MetricKey, MetricValue>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the gauge with the latest reading.
    pub fn record_gauge(&self, name: &str, value: f64) {
        let mut table = self.table.write();
        table.insert(
            MetricKey::new(name, MetricKind::Gauge),
            MetricValue::Gauge(value),
        );
    }

    /// Adds the delta to the counter's running total, starting from 0.
    pub fn record_counter(&self, name: &str, delta: i64) {
        let mut table = self.table.write();
        let slot = table
            .entry(MetricKey::new(name, MetricKind::Counter))
            .or_insert(MetricValue::Counter(0));
        if let MetricValue::Counter(total) = slot {
            *total = total.saturating_add(delta);
        }
    }

    /// Routes a produced sample to the matching record operation. Samples
    /// without their numeric field are dropped with a warning.
    pub fn record(&self, sample: &MetricSample) {
        match sample.validated() {
            Ok((key, MetricValue::Gauge(value))) => self.record_gauge(&key.name, value),
            Ok((key, MetricValue::Counter(delta))) => self.record_counter(&key.name, delta),
            Err(error) => tracing::warn!(id = %sample.id, %error, "dropping malformed sample"),
        }
    }

    /// Immutable point-in-time copy of all records, ordered by name for
    /// stable batches. Does not clear anything.
    pub fn snapshot(&self) -> Batch {
        let table = self.table.read();
        let mut entries: Vec<(&MetricKey, &MetricValue)> = table.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(key, value)| match value {
                MetricValue::Gauge(v) => MetricSample::gauge(key.name.clone(), *v),
                MetricValue::Counter(v) => MetricSample::counter(key.name.clone(), *v),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

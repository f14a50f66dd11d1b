//! The authoritative merge store for current metric values.

use crate::core::{
    Batch, MetricKey, MetricKind, MetricRecord, MetricSample, MetricValue, MetricaError, Result,
    Snapshot,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Current value of every `(name, kind)` pair.
///
/// Merges are serialized per key by the map's shard locks, so concurrent
/// counter increments never lose updates. Constructed explicitly and passed
/// to handlers; there is no process-wide instance.
#[derive(Debug, Default)]
pub struct MetricStore {
    records: DashMap<MetricKey, MetricValue>,
    merges_applied: AtomicU64,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one validated value: gauges overwrite, counters accumulate
    /// from 0. Returns the record after the merge.
    pub fn merge(&self, key: MetricKey, value: MetricValue) -> MetricRecord {
        let name = key.name.clone();
        let merged = match self.records.entry(key) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                *slot = match (*slot, value) {
                    (MetricValue::Counter(prev), MetricValue::Counter(delta)) => {
                        MetricValue::Counter(prev.saturating_add(delta))
                    },
                    // Kind is part of the key, so this arm is gauge overwrite.
                    (_, incoming) => incoming,
                };
                *slot
            },
            Entry::Vacant(vacant) => *vacant.insert(value),
        };
        self.merges_applied.fetch_add(1, Ordering::Relaxed);
        MetricRecord {
            name,
            value: merged,
        }
    }

    /// Validates and merges one wire sample.
    pub fn merge_sample(&self, sample: &MetricSample) -> Result<MetricRecord> {
        let (key, value) = sample.validated()?;
        Ok(self.merge(key, value))
    }

    /// Applies every valid sample in the batch. A malformed sample fails the
    /// batch with the first validation error, but does not undo or block
    /// merges for other names.
    pub fn merge_batch(&self, batch: &Batch) -> Result<Vec<MetricRecord>> {
        let mut merged = Vec::with_capacity(batch.len());
        let mut first_error = None;
        for sample in batch {
            match self.merge_sample(sample) {
                Ok(record) => merged.push(record),
                Err(error) => {
                    tracing::warn!(id = %sample.id, %error, "skipping malformed sample in batch");
                    first_error.get_or_insert(error);
                },
            }
        }
        match first_error {
            None => Ok(merged),
            Some(error) => Err(error),
        }
    }

    /// Point lookup.
    pub fn get(&self, name: &str, kind: MetricKind) -> Result<MetricRecord> {
        self.records
            .get(&MetricKey::new(name, kind))
            .map(|entry| MetricRecord {
                name: name.to_owned(),
                value: *entry.value(),
            })
            .ok_or_else(|| MetricaError::not_found(name, kind.as_str()))
    }

    /// All records ordered by name, then kind, for deterministic rendering.
    pub fn list_all(&self) -> Vec<MetricRecord> {
        let mut entries: Vec<(MetricKey, MetricValue)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
            .into_iter()
            .map(|(key, value)| MetricRecord {
                name: key.name,
                value,
            })
            .collect()
    }

    /// Full serializable image of the store.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            records: self
                .list_all()
                .iter()
                .map(MetricSample::from_record)
                .collect(),
        }
    }

    /// Repopulates the store from a snapshot. Runs before the listener
    /// accepts traffic, so restored values are never racing live merges.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<usize> {
        let records = self.merge_batch(&snapshot.records)?;
        Ok(records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total merges applied since construction.
    pub fn merges_applied(&self) -> u64 {
        self.merges_applied.load(Ordering::Relaxed)
    }
}

//! Memory-only strategy: the store starts empty on every run.

use super::{MetricStore, PersistenceBackend};
use crate::core::{Batch, MetricaError, Result, Snapshot};

/// No durability. Every operation is a no-op except the liveness probe,
/// which reports that there is nothing to probe.
#[derive(Debug, Default)]
pub struct MemoryBackend;

#[async_trait::async_trait]
impl PersistenceBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn notify_merge(&self, _batch: &Batch, _store: &MetricStore) -> Result<()> {
        Ok(())
    }

    async fn flush(&self, _snapshot: Snapshot) -> Result<()> {
        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    async fn ping(&self) -> Result<()> {
        Err(MetricaError::storage("no database configured"))
    }
}

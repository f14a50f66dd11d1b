//! File-snapshot strategy: the full store as one JSON file.

use super::{MetricStore, PersistenceBackend};
use crate::core::{Batch, MetricaError, Result, Snapshot};
use std::io::Write;
use std::path::PathBuf;

/// Writes the whole snapshot atomically: a temp file in the target
/// directory, then a rename, so a crash mid-write never leaves a torn file
/// for the next restore to trip over.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn write_snapshot(path: &PathBuf, snapshot: &Snapshot) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let data = serde_json::to_vec_pretty(snapshot)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&data)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| MetricaError::storage(format!("cannot persist snapshot: {e}")))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn notify_merge(&self, _batch: &Batch, store: &MetricStore) -> Result<()> {
        // Snapshot is copied out before any I/O; the store lock is not held
        // across the write.
        self.flush(store.snapshot()).await
    }

    async fn flush(&self, snapshot: Snapshot) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::write_snapshot(&path, &snapshot)).await?
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        Ok(Some(snapshot))
    }

    async fn ping(&self) -> Result<()> {
        Err(MetricaError::storage("no database configured"))
    }
}

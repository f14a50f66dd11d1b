//! The merge store and its pluggable persistence backends.
//!
//! A [`PersistenceBackend`] owns the durable copy of the store behind a
//! merge-notify / flush / load contract. The strategy is picked once at
//! startup: a configured database DSN takes exclusive precedence over the
//! snapshot file, which in turn beats plain memory.

use crate::core::{Batch, Result, ServerConfig, Snapshot};
use std::sync::Arc;

pub mod file;
pub mod memory;
pub mod postgres;
pub mod store;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;
pub use store::MetricStore;

/// Durable counterpart of [`MetricStore`].
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Called after a batch has been merged, only when the flush interval
    /// is zero. Failures are logged by the caller and never roll back the
    /// in-memory merge.
    async fn notify_merge(&self, batch: &Batch, store: &MetricStore) -> Result<()>;

    /// Writes a full snapshot. Driven by the flush timer and by shutdown.
    async fn flush(&self, snapshot: Snapshot) -> Result<()>;

    /// Loads the durable snapshot at startup. `None` when there is nothing
    /// to restore; corrupt data is reported as an error by the backend and
    /// downgraded to an empty start by the caller.
    async fn load(&self) -> Result<Option<Snapshot>>;

    /// Liveness probe backing `GET /ping`.
    async fn ping(&self) -> Result<()>;
}

/// Selects the backend from configuration. DSN > snapshot file > memory.
pub async fn select_backend(config: &ServerConfig) -> Result<Arc<dyn PersistenceBackend>> {
    if let Some(dsn) = &config.database_dsn {
        let backend = PostgresBackend::connect(dsn).await?;
        return Ok(Arc::new(backend));
    }
    if let Some(path) = &config.store_file {
        return Ok(Arc::new(FileBackend::new(path.clone())));
    }
    Ok(Arc::new(MemoryBackend))
}

//! Collector server: restore, serve, flush.
//!
//! Startup order matters: the snapshot is restored before the listener
//! binds, so an early request can never be overwritten by a slow restore.

pub mod integrity;
pub mod router;

pub use integrity::{keyed_digest, IntegrityGuard, DIGEST_HEADER};
pub use router::{create_router, AppState};

use crate::core::{Result, ServerConfig};
use crate::storage::{select_backend, MetricStore, PersistenceBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Runs the collector until ctrl-c, then flushes and exits.
pub async fn run(config: ServerConfig) -> Result<()> {
    let store = Arc::new(MetricStore::new());
    let backend = select_backend(&config).await?;
    tracing::info!(backend = backend.name(), address = %config.address, "starting collector");

    if config.restore {
        restore_store(&store, backend.as_ref()).await;
    }

    let state = AppState::new(
        Arc::clone(&store),
        Arc::clone(&backend),
        IntegrityGuard::new(config.key.clone()),
        config.sync_flush(),
    );
    let app = create_router(state);

    let listener = TcpListener::bind(&config.address).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flush_task = if config.sync_flush() {
        None
    } else {
        Some(tokio::spawn(flush_loop(
            Arc::clone(&store),
            Arc::clone(&backend),
            config.store_interval(),
            shutdown_rx,
        )))
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the flush timer and wait for its final best-effort flush.
    let _ = shutdown_tx.send(true);
    if let Some(task) = flush_task {
        task.await?;
    }
    tracing::info!("collector stopped");
    Ok(())
}

/// Repopulates the store from the durable snapshot. Missing or corrupt
/// snapshots are non-fatal: the server starts empty and says so.
async fn restore_store(store: &MetricStore, backend: &dyn PersistenceBackend) {
    match backend.load().await {
        Ok(Some(snapshot)) => match store.restore(&snapshot) {
            Ok(count) => tracing::info!(records = count, "restored snapshot"),
            Err(error) => {
                tracing::warn!(%error, "snapshot partially restored, malformed records skipped");
            },
        },
        Ok(None) => tracing::debug!("no snapshot to restore"),
        Err(error) => {
            tracing::warn!(%error, backend = backend.name(), "restore failed, starting empty");
        },
    }
}

/// Single owner of timed persistence: no two flushes ever run at once.
/// Last write between ticks wins. Performs one final flush on shutdown.
async fn flush_loop(
    store: Arc<MetricStore>,
    backend: Arc<dyn PersistenceBackend>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // first tick fires immediately; swallow it
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_once(&store, backend.as_ref()).await;
            }
            _ = shutdown.changed() => {
                flush_once(&store, backend.as_ref()).await;
                return;
            }
        }
    }
}

async fn flush_once(store: &MetricStore, backend: &dyn PersistenceBackend) {
    // Copy first; the store lock is never held across the write.
    let snapshot = store.snapshot();
    if let Err(error) = backend.flush(snapshot).await {
        tracing::error!(%error, backend = backend.name(), "snapshot flush failed");
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "cannot listen for shutdown signal");
    }
}

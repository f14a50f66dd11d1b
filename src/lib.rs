//! Metrica - runtime metrics delivery pipeline.
//!
//! Metrica ships process metrics from a polling agent to a central HTTP
//! collector and merges them into a durable, queryable store.
//!
//! # Architecture
//!
//! The crate is split along the delivery path:
//! - `agent`: sample aggregation and rate-limited, signed, compressed
//!   delivery to the collector
//! - `server`: the HTTP collector that verifies, decodes and merges
//!   incoming batches
//! - `storage`: the merge store and its pluggable persistence backends
//!   (memory, file snapshot, Postgres)
//! - `core`: domain types, configuration, errors and retry policy
//! - `cli`: command-line interfaces for both binaries
//!
//! # Example
//!
//! ```no_run
//! use metrica::core::config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> metrica::Result<()> {
//!     let config = ServerConfig::default();
//!     metrica::server::run(config).await
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod agent;
pub mod cli;
pub mod core;
pub mod server;
pub mod storage;

// Re-export core types for convenience
pub use crate::core::{MetricaError, Result};

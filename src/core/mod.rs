//! Core domain types, configuration and error handling.

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{AgentConfig, ServerConfig};
pub use error::{MetricaError, Result};
pub use types::{Batch, MetricKey, MetricKind, MetricRecord, MetricSample, MetricValue, Snapshot};

//! Configuration for the agent and server binaries.
//!
//! Values come from three layers, lowest precedence first: built-in
//! defaults, an optional JSON config file, then CLI flags / environment
//! variables (applied by [`crate::cli`]). Intervals are integer seconds in
//! every layer, with [`std::time::Duration`] accessors for the timers.

use crate::core::{MetricaError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 5;
const DEFAULT_STORE_INTERVAL_SECS: u64 = 15;
const DEFAULT_STORE_FILE: &str = "/tmp/metrica-db.json";
const DEFAULT_RATE_LIMIT: usize = 1;

/// Agent-side configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Collector address (`host:port`).
    pub address: String,
    /// Seconds between collection ticks.
    pub poll_interval_secs: u64,
    /// Seconds between reporting ticks.
    pub report_interval_secs: u64,
    /// Maximum concurrently in-flight report cycles.
    pub rate_limit: usize,
    /// Shared secret for the keyed integrity digest.
    pub key: Option<String>,
    /// Path to a PEM public key for payload encryption.
    pub crypto_key: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            report_interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            rate_limit: DEFAULT_RATE_LIMIT,
            key: None,
            crypto_key: None,
        }
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Base URL for collector requests.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(MetricaError::config("poll interval must be positive"));
        }
        if self.report_interval_secs == 0 {
            return Err(MetricaError::config("report interval must be positive"));
        }
        if self.rate_limit == 0 {
            return Err(MetricaError::config("rate limit must be at least 1"));
        }
        Ok(())
    }

    /// Overlays values from a JSON config file.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(address) = &file.address {
            self.address = address.clone();
        }
        if let Some(secs) = file.poll_interval {
            self.poll_interval_secs = secs;
        }
        if let Some(secs) = file.report_interval {
            self.report_interval_secs = secs;
        }
        if let Some(limit) = file.rate_limit {
            self.rate_limit = limit;
        }
        if let Some(key) = &file.hash_key {
            self.key = Some(key.clone());
        }
        if let Some(path) = &file.crypto_key {
            self.crypto_key = Some(path.clone());
        }
    }
}

/// Server-side configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address (`host:port`).
    pub address: String,
    /// Seconds between snapshot flushes; 0 flushes after every mutation.
    pub store_interval_secs: u64,
    /// Snapshot file path for the file backend.
    pub store_file: Option<PathBuf>,
    /// Restore the snapshot at startup.
    pub restore: bool,
    /// Postgres connection string; takes precedence over the file backend.
    pub database_dsn: Option<String>,
    /// Shared secret for the keyed integrity digest.
    pub key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            store_interval_secs: DEFAULT_STORE_INTERVAL_SECS,
            store_file: Some(PathBuf::from(DEFAULT_STORE_FILE)),
            restore: true,
            database_dsn: None,
            key: None,
        }
    }
}

impl ServerConfig {
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    /// True when persistence runs synchronously with each mutation.
    pub fn sync_flush(&self) -> bool {
        self.store_interval_secs == 0
    }

    /// Overlays values from a JSON config file.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(address) = &file.address {
            self.address = address.clone();
        }
        if let Some(secs) = file.store_interval {
            self.store_interval_secs = secs;
        }
        if let Some(path) = &file.store_file {
            self.store_file = Some(path.clone());
        }
        if let Some(restore) = file.restore {
            self.restore = restore;
        }
        if let Some(dsn) = &file.database_dsn {
            self.database_dsn = Some(dsn.clone());
        }
        if let Some(key) = &file.hash_key {
            self.key = Some(key.clone());
        }
    }
}

/// JSON config file, shared by both binaries. Absent fields keep the value
/// from the lower-precedence layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub address: Option<String>,
    pub poll_interval: Option<u64>,
    pub report_interval: Option<u64>,
    pub store_interval: Option<u64>,
    pub store_file: Option<PathBuf>,
    pub restore: Option<bool>,
    pub hash_key: Option<String>,
    pub rate_limit: Option<usize>,
    pub crypto_key: Option<PathBuf>,
    pub database_dsn: Option<String>,
}

impl ConfigFile {
    /// Loads and parses a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MetricaError::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            MetricaError::config(format!("cannot parse config file {}: {e}", path.display()))
        })
    }
}

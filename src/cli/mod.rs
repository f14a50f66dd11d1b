//! Command-line interfaces for the agent and server binaries.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file named
//! by `-c`/`CONFIG`, then flags and environment variables (clap resolves
//! env fallbacks per flag).

use crate::core::config::{AgentConfig, ConfigFile, ServerConfig};
use crate::core::Result;
use clap::Parser;
use std::path::PathBuf;

/// Metrics agent: polls sample sources and reports to the collector.
#[derive(Parser, Debug)]
#[command(name = "metrica-agent", version, about)]
pub struct AgentCli {
    /// Collector address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between collection ticks
    #[arg(short = 'p', long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Seconds between reporting ticks
    #[arg(short = 'r', long, env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Maximum concurrently in-flight report cycles
    #[arg(short = 'l', long, env = "RATE_LIMIT")]
    pub rate_limit: Option<usize>,

    /// Shared secret for the integrity digest
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Path to a PEM public key for payload encryption
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// JSON config file path
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

impl AgentCli {
    /// Resolves the final configuration.
    pub fn into_config(self) -> Result<AgentConfig> {
        let mut config = AgentConfig::default();
        if let Some(path) = &self.config {
            config.apply_file(&ConfigFile::load(path)?);
        }
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if let Some(secs) = self.report_interval {
            config.report_interval_secs = secs;
        }
        if let Some(limit) = self.rate_limit {
            config.rate_limit = limit;
        }
        if let Some(key) = self.key {
            config.key = Some(key);
        }
        if let Some(path) = self.crypto_key {
            config.crypto_key = Some(path);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Metrics collector: merges reported samples and persists snapshots.
#[derive(Parser, Debug)]
#[command(name = "metrica-server", version, about)]
pub struct ServerCli {
    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Seconds between snapshot flushes; 0 flushes after every mutation
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Snapshot file path
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub store_file: Option<PathBuf>,

    /// Restore the snapshot at startup (true/false)
    #[arg(short = 'r', long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// Postgres connection string; takes precedence over the file backend
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Shared secret for the integrity digest
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// JSON config file path
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

impl ServerCli {
    /// Resolves the final configuration.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();
        if let Some(path) = &self.config {
            config.apply_file(&ConfigFile::load(path)?);
        }
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(secs) = self.store_interval {
            config.store_interval_secs = secs;
        }
        if let Some(path) = self.store_file {
            config.store_file = Some(path);
        }
        if let Some(restore) = self.restore {
            config.restore = restore;
        }
        if let Some(dsn) = self.database_dsn {
            config.database_dsn = Some(dsn);
        }
        if let Some(key) = self.key {
            config.key = Some(key);
        }
        Ok(config)
    }
}

/// Initializes the tracing subscriber; `RUST_LOG` filters, default `info`.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

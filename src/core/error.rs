use thiserror::Error;

/// Errors produced anywhere in the delivery pipeline.
#[derive(Error, Debug)]
pub enum MetricaError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("metric not found: {name} ({kind})")]
    NotFound { name: String, kind: String },

    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("report cycle skipped: all {limit} send slots in flight")]
    RateLimited { limit: usize },
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, MetricaError>;

impl MetricaError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a new crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        Self::Crypto(msg.into())
    }

    /// Creates a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn not_found(name: &str, kind: &str) -> Self {
        Self::NotFound {
            name: name.to_owned(),
            kind: kind.to_owned(),
        }
    }

    /// Returns true if retrying the failed operation can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Storage(_) | Self::Io(_) => "storage",
            Self::Network(_) | Self::RateLimited { .. } => "network",
            Self::Auth(_) => "auth",
            Self::Crypto(_) => "crypto",
            Self::NotFound { .. } => "not_found",
            Self::InvalidMetric(_) | Self::Parse { .. } | Self::Serialization(_) => "validation",
            Self::Database(_) => "database",
            Self::Join(_) => "async",
        }
    }
}

//! Error types for dbtune

use std::time::Duration;

use thiserror::Error;

/// Core error type for dbtune operations
#[derive(Error, Debug)]
pub enum DbtuneError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The engine rejected or failed the requested statement
    #[error("Query error: {0}")]
    Query(String),

    /// Every permitted handle was busy for the whole acquire timeout
    #[error("Connection pool exhausted: all {max_size} connections in use after waiting {waited:?}")]
    PoolExhausted { max_size: usize, waited: Duration },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DbtuneError {
    /// Whether the caller hit pool capacity rather than an engine failure.
    ///
    /// Exhaustion is transient and worth a backoff-and-retry; query errors are not.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, DbtuneError::PoolExhausted { .. })
    }

    /// Whether the error came from the engine executing a statement
    pub fn is_query_error(&self) -> bool {
        matches!(self, DbtuneError::Query(_))
    }
}

/// Result type alias for dbtune operations
pub type Result<T> = std::result::Result<T, DbtuneError>;

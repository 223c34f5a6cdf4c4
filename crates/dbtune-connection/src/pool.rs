//! Connection pooling for database connections
//!
//! This module provides a bounded pool with an acquire timeout, age-based
//! recycling and hit/miss statistics.
//!
//! # Example
//!
//! ```ignore
//! use dbtune_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10)
//!     .with_acquire_timeout_ms(5000)
//!     .with_max_age_ms(300_000);
//!
//! let pool = ConnectionPool::new(config, connection_factory).await?;
//! let conn = pool.acquire().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PoolConfig;
pub use pool::{ConnectionFactory, ConnectionPool, HandleId, PooledConnection};
pub use stats::PoolStats;

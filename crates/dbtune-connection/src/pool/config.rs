//! Pool configuration types

use std::time::Duration;

use dbtune_core::{DbtuneError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls pool sizing, the acquire timeout and connection recycling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections opened when the pool is constructed
    min_size: usize,
    /// Maximum number of connections the pool will ever track at once
    max_size: usize,
    /// How long `acquire` waits for a released connection, in milliseconds
    acquire_timeout_ms: u64,
    /// Age in milliseconds after which a connection is replaced at acquire time
    max_age_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given min and max sizes
    ///
    /// # Panics
    ///
    /// Panics if `min_size > max_size` or if `max_size` is 0.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );

        Self {
            min_size,
            max_size,
            acquire_timeout_ms: 30_000, // 30 seconds default
            max_age_ms: 300_000,        // 5 minutes default
        }
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum connection age in milliseconds
    pub fn with_max_age_ms(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the acquire timeout as a Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Get the maximum connection age as a Duration
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    /// Check the sizing rules for configurations that bypassed [`PoolConfig::new`],
    /// e.g. ones read from a settings file.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DbtuneError::Configuration(
                "pool max_size must be greater than 0".into(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(DbtuneError::Configuration(format!(
                "pool min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - min_size: 2
    /// - max_size: 10
    /// - acquire_timeout: 30 seconds
    /// - max_age: 5 minutes
    fn default() -> Self {
        Self::new(2, 10)
    }
}

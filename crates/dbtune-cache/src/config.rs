//! Cache configuration

use std::time::Duration;

use dbtune_core::{DbtuneError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a [`QueryCache`](crate::QueryCache)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long an entry stays valid after it was written, in milliseconds
    ttl_ms: u64,
    /// Maximum number of entries held at once
    max_size: usize,
}

impl CacheConfig {
    /// Create a cache configuration
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0.
    pub fn new(ttl_ms: u64, max_size: usize) -> Self {
        assert!(
            max_size > 0,
            "max_size must be greater than 0, got {}",
            max_size
        );
        Self { ttl_ms, max_size }
    }

    /// Set the time to live in milliseconds
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Set the maximum entry count
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Reject configurations that bypassed [`CacheConfig::new`]
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(DbtuneError::Configuration(
                "cache max_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    /// Five minute TTL, 1000 entries
    fn default() -> Self {
        Self::new(300_000, 1000)
    }
}

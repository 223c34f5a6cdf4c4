//! Cache statistics

use serde::{Deserialize, Serialize};

/// Point-in-time statistics about a query cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet read
    pub cache_size: usize,
    pub max_size: usize,
    pub ttl_ms: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room for a new key
    pub evictions: u64,
}

impl CacheStats {
    /// Lookups since the counters were last reset
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Share of lookups served from the cache, as a percentage (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Point-in-time statistics about a connection pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections opened over the pool's lifetime, including replacements
    pub total_created: u64,
    /// Calls to `acquire`
    pub total_requests: u64,
    /// Acquisitions served by reusing an idle connection
    pub hits: u64,
    /// Acquisitions that had to open a connection (growth or max-age replacement)
    pub misses: u64,
    /// Idle connections ready to be handed out
    pub available: usize,
    /// Connections currently held by callers
    pub in_use: usize,
    /// Callers currently waiting inside `acquire`
    pub waiting: usize,
    /// Releases of connections the pool was no longer tracking
    pub invalid_releases: u64,
    /// Released connections closed because the idle set was already full
    pub overflow_closes: u64,
}

impl PoolStats {
    /// Idle plus busy connections
    pub fn total_connections(&self) -> usize {
        self.available + self.in_use
    }

    /// Share of requests served by reuse, as a percentage (0.0 to 100.0)
    ///
    /// Returns 0.0 when no requests were made.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64 * 100.0
        }
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if the pool tracks no connections.
    pub fn utilization(&self) -> f64 {
        let total = self.total_connections();
        if total == 0 {
            0.0
        } else {
            self.in_use as f64 / total as f64
        }
    }

    /// Check if every tracked connection is in use
    pub fn is_full(&self) -> bool {
        self.available == 0 && self.in_use > 0
    }
}

//! Query result cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dbtune_core::{Row, Value};
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::key::CacheKey;
use crate::stats::CacheStats;


/// Rows stored in the cache, shared with every reader
pub type CachedRows = Arc<Vec<Row>>;

struct CacheEntry {
    inserted_at: Instant,
    /// Write order, breaks ties between equal timestamps
    seq: u64,
    rows: CachedRows,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() < ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// A bounded map from (query, params) to result rows with a fixed time to live
///
/// Lookups and writes are short critical sections over the map and counters.
/// No background task sweeps expired entries; they are dropped when read, or
/// chosen for eviction like any other entry.
pub struct QueryCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

fn preview(query: &str) -> String {
    query.chars().take(50).collect()
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        tracing::info!(
            ttl_ms = config.ttl().as_millis() as u64,
            max_size = config.max_size(),
            "query cache initialized"
        );
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up cached rows, counting a hit or a miss
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, query: &str, params: &[Value]) -> Option<CachedRows> {
        let key = match CacheKey::derive(query, params) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, query = %preview(query), "could not derive cache key");
                self.state.lock().misses += 1;
                return None;
            }
        };

        let ttl = self.config.ttl();
        let mut state = self.state.lock();
        let lookup = state
            .entries
            .get(&key)
            .map(|entry| entry.is_fresh(ttl).then(|| entry.rows.clone()));

        let fresh = match lookup {
            Some(Some(rows)) => Some(rows),
            Some(None) => {
                state.entries.remove(&key);
                tracing::debug!(query = %preview(query), "cache entry expired");
                None
            }
            None => None,
        };

        match fresh {
            Some(rows) => {
                state.hits += 1;
                tracing::debug!(query = %preview(query), "cache hit");
                Some(rows)
            }
            None => {
                state.misses += 1;
                tracing::debug!(query = %preview(query), "cache miss");
                None
            }
        }
    }

    /// Store rows for a query, evicting the oldest write if a new key would overflow the cache
    ///
    /// Re-setting an existing key replaces its rows and timestamp without evicting.
    pub fn set(&self, query: &str, params: &[Value], rows: CachedRows) {
        let key = match CacheKey::derive(query, params) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, query = %preview(query), "could not derive cache key, result not cached");
                return;
            }
        };

        let mut state = self.state.lock();
        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_size() {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.inserted_at, entry.seq))
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                state.evictions += 1;
                tracing::debug!(evicted = %oldest, "cache eviction (max size reached)");
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                inserted_at: Instant::now(),
                seq,
                rows,
            },
        );
        tracing::debug!(query = %preview(query), "cached query result");
    }

    /// Drop one query's entry, or every entry when `query` is `None`
    ///
    /// Counters are left untouched either way; use [`QueryCache::clear`] to reset them.
    pub fn invalidate(&self, query: Option<&str>, params: &[Value]) {
        let Some(query) = query else {
            self.state.lock().entries.clear();
            tracing::info!("entire cache invalidated");
            return;
        };

        match CacheKey::derive(query, params) {
            Ok(key) => {
                if self.state.lock().entries.remove(&key).is_some() {
                    tracing::debug!(query = %preview(query), "cache entry invalidated");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, query = %preview(query), "could not derive cache key");
            }
        }
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
        state.evictions = 0;
        tracing::info!("cache cleared");
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            cache_size: state.entries.len(),
            max_size: self.config.max_size(),
            ttl_ms: self.config.ttl().as_millis() as u64,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

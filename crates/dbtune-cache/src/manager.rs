//! Named caches and invalidation strategies

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::QueryCache;
use crate::config::CacheConfig;
use crate::stats::CacheStats;

/// Registry of independently configured caches
#[derive(Default)]
pub struct CacheManager {
    caches: RwLock<HashMap<String, Arc<QueryCache>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a named cache and return it
    pub fn create_cache(&self, name: impl Into<String>, config: CacheConfig) -> Arc<QueryCache> {
        let name = name.into();
        tracing::info!(
            cache = %name,
            ttl_ms = config.ttl().as_millis() as u64,
            max_size = config.max_size(),
            "cache created"
        );
        let cache = Arc::new(QueryCache::new(config));
        self.caches.write().insert(name, cache.clone());
        cache
    }

    pub fn get_cache(&self, name: &str) -> Option<Arc<QueryCache>> {
        self.caches.read().get(name).cloned()
    }

    /// Clear one cache; unknown names are ignored
    pub fn clear_cache(&self, name: &str) {
        if let Some(cache) = self.get_cache(name) {
            cache.clear();
            tracing::info!(cache = %name, "cache cleared");
        }
    }

    pub fn clear_all(&self) {
        for cache in self.caches.read().values() {
            cache.clear();
        }
        tracing::info!("all caches cleared");
    }

    /// Statistics for every cache, ordered by name
    pub fn all_stats(&self) -> BTreeMap<String, CacheStats> {
        self.caches
            .read()
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect()
    }
}

/// Invalidation triggered by writes
///
/// Entries are not indexed by table, so both strategies drop the whole cache.
pub struct CacheStrategy;

impl CacheStrategy {
    /// Invalidate after `table` was modified
    pub fn invalidate_on_write(cache: &QueryCache, table: &str) {
        cache.clear();
        tracing::info!(table = %table, "cache invalidated after write");
    }

    /// Invalidate entries matching `pattern`
    pub fn invalidate_pattern(cache: &QueryCache, pattern: &str) {
        cache.clear();
        tracing::info!(pattern = %pattern, "cache invalidated for pattern");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbtune_core::{Row, Value};
    use pretty_assertions::assert_eq;

    fn one_row() -> Arc<Vec<Row>> {
        Arc::new(vec![Row::new(vec!["n".into()], vec![Value::Int64(1)])])
    }

    #[test]
    fn test_named_caches_are_independent() {
        let manager = CacheManager::new();
        let users = manager.create_cache("users", CacheConfig::new(60_000, 10));
        let orders = manager.create_cache("orders", CacheConfig::new(60_000, 5));

        users.set("SELECT * FROM users", &[], one_row());
        assert!(orders.get("SELECT * FROM users", &[]).is_none());

        let fetched = manager.get_cache("users").expect("users cache");
        assert!(Arc::ptr_eq(&fetched, &users));
        assert!(manager.get_cache("missing").is_none());

        let stats = manager.all_stats();
        assert_eq!(
            stats.keys().cloned().collect::<Vec<_>>(),
            vec!["orders".to_string(), "users".to_string()]
        );
        assert_eq!(stats["users"].cache_size, 1);
        assert_eq!(stats["orders"].max_size, 5);
        assert_eq!(stats["orders"].misses, 1);
    }

    #[test]
    fn test_clear_cache_and_clear_all() {
        let manager = CacheManager::new();
        let a = manager.create_cache("a", CacheConfig::default());
        let b = manager.create_cache("b", CacheConfig::default());
        a.set("SELECT 1", &[], one_row());
        b.set("SELECT 1", &[], one_row());

        manager.clear_cache("a");
        manager.clear_cache("does-not-exist");
        assert!(a.is_empty());
        assert_eq!(b.len(), 1);

        manager.clear_all();
        assert!(b.is_empty());
    }

    #[test]
    fn test_strategies_clear_the_whole_cache() {
        let cache = QueryCache::new(CacheConfig::default());
        cache.set("SELECT * FROM users", &[], one_row());
        cache.set("SELECT * FROM orders", &[], one_row());
        cache.get("SELECT * FROM users", &[]);

        CacheStrategy::invalidate_on_write(&cache, "orders");
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 0);

        cache.set("SELECT * FROM users", &[], one_row());
        CacheStrategy::invalidate_pattern(&cache, "users%");
        assert!(cache.is_empty());
    }
}

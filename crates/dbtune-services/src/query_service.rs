//! Cache-aside query service
//!
//! Wires one shared pool, cache and analyzer together with an explicit
//! start/shutdown lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dbtune_analyzer::{
    ExplainResult, QueryAnalyzer, QueryComparison, QueryStats, SlowQueryDetector, SlowQueryEntry,
    timed, timed_with_threshold,
};
use dbtune_cache::{CacheManager, CacheStats, CacheStrategy, CachedRows, QueryCache};
use dbtune_connection::{ConnectionFactory, ConnectionPool, PoolStats};
use dbtune_core::Value;
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::error::ServiceResult;

/// Name of the read-result cache in the service's [`CacheManager`]
pub const QUERY_CACHE: &str = "queries";

/// Rows returned by [`QueryService::cached_query`]
#[derive(Debug, Clone)]
pub struct CachedQueryResult {
    pub rows: CachedRows,
    /// Served from the cache without touching the database
    pub cached: bool,
    /// Engine time for a fresh execution, lookup time for a cache hit
    pub execution_time: Duration,
    /// Always false for cache hits
    pub is_slow: bool,
}

impl CachedQueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names taken from the first row
    pub fn column_names(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.columns().to_vec())
            .unwrap_or_default()
    }
}

/// Combined statistics for observability surfaces
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub pool: PoolStats,
    pub cache: CacheStats,
    pub analyzer: QueryStats,
    /// Committed writes slower than the analyzer threshold
    pub slow_writes: usize,
}

/// Request-handling context owning the pool, cache and analyzer
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct QueryService {
    config: ServiceConfig,
    pool: Arc<ConnectionPool>,
    caches: CacheManager,
    cache: Arc<QueryCache>,
    analyzer: Arc<QueryAnalyzer>,
    slow_writes: SlowQueryDetector,
}

impl QueryService {
    /// Validate the configuration, warm the pool and build the cache and analyzer
    #[tracing::instrument(skip(config, factory), fields(database = %config.database))]
    pub async fn start<F: ConnectionFactory>(
        config: ServiceConfig,
        factory: F,
    ) -> ServiceResult<Self> {
        config.validate()?;

        let pool = ConnectionPool::new(config.pool.clone(), factory).await?;
        let caches = CacheManager::new();
        let cache = caches.create_cache(QUERY_CACHE, config.cache.clone());
        let analyzer = QueryAnalyzer::new(config.analyzer.clone());
        let slow_writes = SlowQueryDetector::new(config.analyzer.slow_threshold());

        tracing::info!("query service started");
        Ok(Self {
            config,
            pool: Arc::new(pool),
            caches,
            cache,
            analyzer: Arc::new(analyzer),
            slow_writes,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn analyzer(&self) -> &Arc<QueryAnalyzer> {
        &self.analyzer
    }

    /// Every cache the service owns, keyed by name
    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    /// Committed writes that ran longer than the slow threshold, oldest first
    pub fn slow_writes(&self, limit: Option<usize>) -> Vec<SlowQueryEntry> {
        self.slow_writes.slow_queries(limit)
    }

    /// Answer a read from the cache, or run it through the analyzer and cache the rows
    ///
    /// The connection goes back to the pool before the result is stored, and
    /// a failed query leaves the cache untouched.
    #[tracing::instrument(skip(self, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn cached_query(&self, sql: &str, params: &[Value]) -> ServiceResult<CachedQueryResult> {
        let started = Instant::now();
        if let Some(rows) = self.cache.get(sql, params) {
            tracing::debug!(rows = rows.len(), "served from cache");
            return Ok(CachedQueryResult {
                rows,
                cached: true,
                execution_time: started.elapsed(),
                is_slow: false,
            });
        }

        let conn = self.pool.acquire().await?;
        let analysis = self.analyzer.analyze_query(&*conn, sql, params).await;
        conn.release();
        let analysis = analysis?;

        let execution_time = analysis.execution_time();
        let is_slow = analysis.is_slow();
        let rows: CachedRows = Arc::new(analysis.rows);
        self.cache.set(sql, params, rows.clone());

        Ok(CachedQueryResult {
            rows,
            cached: false,
            execution_time,
            is_slow,
        })
    }

    /// Run a write, commit it and invalidate cached reads
    ///
    /// If the statement or its commit fails, the transaction is rolled back
    /// and the cache is left alone.
    /// Returns the number of affected rows.
    #[tracing::instrument(skip(self, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn execute_write(&self, sql: &str, params: &[Value], table: &str) -> ServiceResult<u64> {
        let conn = self.pool.acquire().await?;

        let (outcome, elapsed) = timed(async {
            match conn.execute(sql, params).await {
                Ok(result) => conn.commit().await.map(|()| result.affected_rows),
                Err(e) => Err(e),
            }
        })
        .await;
        // A failed commit leaves the transaction open on a connection headed back to the pool.
        if let Err(e) = &outcome {
            tracing::warn!(error = %e, "write failed, rolling back");
            if let Err(rollback_err) = conn.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback after failed write also failed");
            }
        }
        conn.release();

        let affected = outcome?;
        self.slow_writes.detect(sql, elapsed, params);
        CacheStrategy::invalidate_on_write(&self.cache, table);
        tracing::debug!(
            affected,
            table,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "write committed"
        );
        Ok(affected)
    }

    /// Fetch the plan for a query on a pooled connection
    pub async fn explain(&self, sql: &str, params: &[Value]) -> ServiceResult<ExplainResult> {
        let conn = self.pool.acquire().await?;
        let threshold = self.analyzer.config().slow_threshold();
        let (result, _) = timed_with_threshold(
            "explain",
            threshold,
            self.analyzer.explain_query(&*conn, sql, params),
        )
        .await;
        Ok(result)
    }

    /// Time two queries back to back on the same pooled connection
    ///
    /// Bypasses the cache so both sides hit the engine.
    pub async fn compare(
        &self,
        first: (&str, &[Value]),
        second: (&str, &[Value]),
    ) -> ServiceResult<QueryComparison> {
        let conn = self.pool.acquire().await?;
        Ok(self.analyzer.compare_queries(&*conn, first, second).await?)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            pool: self.pool.stats(),
            cache: self.cache.stats(),
            analyzer: self.analyzer.get_query_stats(),
            slow_writes: self.slow_writes.slow_queries(None).len(),
        }
    }

    /// Drop every cached result
    pub fn clear_cache(&self) {
        self.caches.clear_all();
    }

    /// Close every pooled connection; later requests fail with `PoolClosed`
    pub async fn shutdown(&self) {
        self.pool.close_all().await;
        tracing::info!(
            cached_entries = self.cache.len(),
            analyzed = self.analyzer.history().len(),
            "query service shut down"
        );
    }
}

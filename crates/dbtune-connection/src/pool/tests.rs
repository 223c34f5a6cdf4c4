//! Tests for connection pool functionality

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dbtune_core::{Connection, DbtuneError, QueryResult, Result, StatementResult, Value};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::config::PoolConfig;
use super::pool::{ConnectionFactory, ConnectionPool};
use super::stats::PoolStats;

/// Mock connection for testing
struct MockConnection {
    #[allow(dead_code)]
    id: usize,
    closed: AtomicBool,
}

impl MockConnection {
    fn new(id: usize) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult { affected_rows: 0 })
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory that remembers every connection it opened
struct MockConnectionFactory {
    counter: AtomicUsize,
    opened: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnectionFactory {
    fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    fn closed_count(&self) -> usize {
        self.opened.lock().iter().filter(|c| c.is_closed()).count()
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection::new(id));
        self.opened.lock().push(conn.clone());
        Ok(conn)
    }
}

/// Factory that takes `delay` to open each connection
struct SlowConnectionFactory {
    inner: MockConnectionFactory,
    delay_ms: AtomicU64,
}

impl SlowConnectionFactory {
    fn new(delay: Duration) -> Self {
        Self {
            inner: MockConnectionFactory::new(),
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
        }
    }

    fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for SlowConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));
        tokio::time::sleep(delay).await;
        self.inner.create().await
    }
}

/// Factory whose engine is unreachable
struct FailingFactory;

#[async_trait]
impl ConnectionFactory for FailingFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        Err(DbtuneError::Connection("engine unreachable".into()))
    }
}

fn assert_within_capacity(stats: &PoolStats, max_size: usize) {
    assert!(
        stats.total_connections() <= max_size,
        "pool tracks {} connections with max_size {}",
        stats.total_connections(),
        max_size
    );
}

// =============================================================================
// PoolConfig tests
// =============================================================================

#[test]
fn test_pool_config_creation() {
    let config = PoolConfig::new(2, 10);
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 10);
    assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
    assert_eq!(config.max_age(), Duration::from_millis(300_000));
}

#[test]
fn test_pool_config_with_timeouts() {
    let config = PoolConfig::new(1, 5)
        .with_acquire_timeout_ms(5000)
        .with_max_age_ms(60_000);

    assert_eq!(config.acquire_timeout(), Duration::from_millis(5000));
    assert_eq!(config.max_age(), Duration::from_millis(60_000));
}

#[test]
fn test_pool_config_default() {
    let config = PoolConfig::default();
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 10);
}

#[test]
#[should_panic(expected = "max_size must be greater than 0")]
fn test_pool_config_invalid_max_size() {
    PoolConfig::new(0, 0);
}

#[test]
#[should_panic(expected = "min_size (10) cannot exceed max_size (5)")]
fn test_pool_config_min_exceeds_max() {
    PoolConfig::new(10, 5);
}

#[test]
fn test_pool_config_validate_rejects_deserialized_nonsense() {
    let config: PoolConfig =
        serde_json::from_str(r#"{"min_size": 4, "max_size": 2}"#).expect("deserialize");
    let err = config.validate().expect_err("min above max");
    assert!(err.to_string().contains("cannot exceed"));

    let config: PoolConfig = serde_json::from_str(r#"{"max_size": 0, "min_size": 0}"#)
        .expect("deserialize");
    assert!(config.validate().is_err());
}

#[test]
fn test_pool_config_serialization() {
    let config = PoolConfig::new(2, 10)
        .with_acquire_timeout_ms(5000)
        .with_max_age_ms(3_600_000);

    let json = serde_json::to_string(&config).expect("serialize");
    let deserialized: PoolConfig = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(deserialized, config);
}

#[test]
fn test_pool_config_partial_deserialization_uses_defaults() {
    let config: PoolConfig = serde_json::from_str(r#"{"max_size": 4}"#).expect("deserialize");
    assert_eq!(config.max_size(), 4);
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(30));
}

// =============================================================================
// PoolStats tests
// =============================================================================

#[test]
fn test_pool_stats_hit_rate() {
    let stats = PoolStats {
        total_requests: 4,
        hits: 3,
        misses: 1,
        ..Default::default()
    };
    assert!((stats.hit_rate() - 75.0).abs() < 0.001);
    assert!((PoolStats::default().hit_rate() - 0.0).abs() < 0.001);
}

#[test]
fn test_pool_stats_utilization() {
    let stats = PoolStats {
        available: 5,
        in_use: 5,
        ..Default::default()
    };
    assert_eq!(stats.total_connections(), 10);
    assert!((stats.utilization() - 0.5).abs() < 0.001);
    assert!(!stats.is_full());

    let full = PoolStats {
        available: 0,
        in_use: 3,
        ..Default::default()
    };
    assert!(full.is_full());
    assert!(!PoolStats::default().is_full());
}

// =============================================================================
// ConnectionPool tests
// =============================================================================

#[tokio::test]
async fn test_pool_warms_min_connections() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(3, 5), factory.clone())
        .await
        .expect("create pool");

    let stats = pool.stats();
    assert_eq!(stats.available, 3);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.total_created, 3);
    assert_eq!(factory.count(), 3);
}

#[tokio::test]
async fn test_pool_construction_fails_when_engine_unreachable() {
    let result = ConnectionPool::new(PoolConfig::new(1, 2), FailingFactory).await;
    assert!(matches!(result, Err(DbtuneError::Connection(_))));
}

#[tokio::test]
async fn test_pool_acquire_reuses_idle_connection() {
    let factory = Arc::new(MockConnectionFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(1, 5), factory.clone())
        .await
        .expect("create pool");

    for _ in 0..5 {
        let conn = pool.acquire().await.expect("acquire");
        assert_eq!(conn.driver_name(), "mock");
        assert!(conn.is_busy());
    }

    let stats = pool.stats();
    assert_eq!(factory.count(), 1);
    assert_eq!(stats.total_requests, 5);
    assert_eq!(stats.hits, 5);
    assert_eq!(stats.misses, 0);
    assert!((stats.hit_rate() - 100.0).abs() < 0.001);
}

#[tokio::test]
async fn test_pool_connection_return_on_drop() {
    let pool = ConnectionPool::new(PoolConfig::new(1, 5), MockConnectionFactory::new())
        .await
        .expect("create pool");

    {
        let _conn = pool.acquire().await.expect("acquire");
        let stats = pool.stats();
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.available, 0);
    }

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, 1);
}

#[tokio::test]
async fn test_pool_explicit_release() {
    let pool = ConnectionPool::new(PoolConfig::new(2, 2), MockConnectionFactory::new())
        .await
        .expect("create pool");

    let first = pool.acquire().await.expect("acquire");
    let second = pool.acquire().await.expect("acquire");
    assert_ne!(first.id(), second.id());

    first.release();
    assert_eq!(pool.stats().available, 1);
    second.release();
    assert_eq!(pool.stats().available, 2);
}

#[tokio::test]
async fn test_pool_grows_after_wait_expires() {
    let factory = Arc::new(MockConnectionFactory::new());
    let config = PoolConfig::new(1, 2).with_acquire_timeout_ms(50);
    let pool = ConnectionPool::new(config, factory.clone())
        .await
        .expect("create pool");

    let _first = pool.acquire().await.expect("acquire idle");

    let start = Instant::now();
    let _second = pool.acquire().await.expect("acquire new");
    assert!(start.elapsed() >= Duration::from_millis(50));

    let stats = pool.stats();
    assert_eq!(factory.count(), 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.in_use, 2);
}

#[tokio::test]
async fn test_pool_exhausted_after_timeout() {
    let config = PoolConfig::new(2, 2).with_acquire_timeout_ms(100);
    let pool = ConnectionPool::new(config, MockConnectionFactory::new())
        .await
        .expect("create pool");

    let conn1 = pool.acquire().await.expect("acquire 1");
    let conn2 = pool.acquire().await.expect("acquire 2");
    assert_eq!(pool.stats().in_use, 2);

    let start = Instant::now();
    let result = pool.acquire().await;
    let elapsed = start.elapsed();

    let err = result.err().expect("third acquire should fail");
    assert!(err.is_pool_exhausted(), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2));
    assert_within_capacity(&pool.stats(), 2);

    drop(conn1);
    drop(conn2);
}

#[tokio::test]
async fn test_pool_release_wakes_waiting_acquire() {
    let config = PoolConfig::new(1, 1).with_acquire_timeout_ms(5_000);
    let pool = ConnectionPool::new(config, MockConnectionFactory::new())
        .await
        .expect("create pool");

    let held = pool.acquire().await.expect("acquire");
    let held_id = held.id();

    let start = Instant::now();
    let (_, next) = tokio::join!(
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        },
        pool.acquire()
    );
    let next = next.expect("waiting acquire should get the released connection");

    assert_eq!(next.id(), held_id);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(pool.stats().misses, 0);
}

#[tokio::test]
async fn test_pool_replaces_connection_older_than_max_age() {
    let factory = Arc::new(MockConnectionFactory::new());
    let config = PoolConfig::new(1, 2).with_max_age_ms(20);
    let pool = ConnectionPool::new(config, factory.clone())
        .await
        .expect("create pool");

    tokio::time::sleep(Duration::from_millis(40)).await;

    let conn = pool.acquire().await.expect("acquire");
    assert!(conn.created_at().elapsed() < Duration::from_millis(20));

    let stats = pool.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.total_created, 2);
    assert_eq!(stats.in_use, 1);
    assert_eq!(factory.closed_count(), 1);
}

#[tokio::test]
async fn test_pool_close_all_closes_idle_and_busy() {
    let factory = Arc::new(MockConnectionFactory::new());
    let config = PoolConfig::new(2, 2).with_acquire_timeout_ms(50);
    let pool = ConnectionPool::new(config, factory.clone())
        .await
        .expect("create pool");

    let held = pool.acquire().await.expect("acquire");
    pool.close_all().await;

    assert!(pool.is_closed());
    assert_eq!(factory.closed_count(), 2);
    let stats = pool.stats();
    assert_eq!(stats.available, 0);
    assert_eq!(stats.in_use, 0);

    assert!(matches!(pool.acquire().await, Err(DbtuneError::PoolClosed)));

    // Returning a connection the pool no longer tracks is a no-op.
    drop(held);
    let stats = pool.stats();
    assert_eq!(stats.invalid_releases, 1);
    assert_eq!(stats.available, 0);
}

#[tokio::test]
async fn test_pool_exhaustion_scenario() {
    let config = PoolConfig::new(2, 3).with_acquire_timeout_ms(200);
    let pool = ConnectionPool::new(config, MockConnectionFactory::new())
        .await
        .expect("create pool");

    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(pool.acquire().await.expect("acquire within capacity"));
    }
    assert_within_capacity(&pool.stats(), 3);

    let start = Instant::now();
    let err = pool.acquire().await.err().expect("fourth acquire");
    assert!(err.is_pool_exhausted());
    assert!(start.elapsed() >= Duration::from_millis(200));

    held.pop();
    let start = Instant::now();
    let _fourth = pool.acquire().await.expect("acquire after release");
    assert!(start.elapsed() < Duration::from_millis(200));
    assert_within_capacity(&pool.stats(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_capacity_invariant_under_contention() {
    const MAX_SIZE: usize = 4;
    let config = PoolConfig::new(1, MAX_SIZE).with_acquire_timeout_ms(20);
    let pool = Arc::new(
        ConnectionPool::new(config, MockConnectionFactory::new())
            .await
            .expect("create pool"),
    );

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let mut exhausted = 0u64;
            for _ in 0..20 {
                match pool.acquire().await {
                    Ok(conn) => {
                        assert!(conn.is_busy());
                        assert_within_capacity(&pool.stats(), MAX_SIZE);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    }
                    Err(e) if e.is_pool_exhausted() => exhausted += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
                assert_within_capacity(&pool.stats(), MAX_SIZE);
            }
            exhausted
        }));
    }

    let mut exhausted = 0u64;
    for task in tasks {
        exhausted += task.await.expect("task panicked");
    }

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.overflow_closes, 0);
    assert_eq!(stats.invalid_releases, 0);
    assert!(stats.total_created <= MAX_SIZE as u64);
    assert_eq!(stats.total_requests, 12 * 20);
    assert_eq!(stats.hits + stats.misses + exhausted, stats.total_requests);
}

// =============================================================================
// Cancelled acquire tests
// =============================================================================

#[tokio::test]
async fn test_cancelled_grow_returns_reserved_slot() {
    let factory = Arc::new(SlowConnectionFactory::new(Duration::from_millis(200)));
    let config = PoolConfig::new(0, 1).with_acquire_timeout_ms(10);
    let pool = ConnectionPool::new(config, factory.clone())
        .await
        .expect("create pool");

    let abandoned = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(abandoned.is_err(), "acquire should still be opening a connection");

    let stats = pool.stats();
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.total_connections(), 0);

    factory.set_delay(Duration::ZERO);
    let conn = pool.acquire().await.expect("slot should be free again");
    assert!(conn.is_busy());
    assert_within_capacity(&pool.stats(), 1);
}

#[tokio::test]
async fn test_cancelled_wait_leaves_no_waiter_behind() {
    let config = PoolConfig::new(1, 1).with_acquire_timeout_ms(5_000);
    let pool = ConnectionPool::new(config, MockConnectionFactory::new())
        .await
        .expect("create pool");

    let held = pool.acquire().await.expect("acquire");

    let abandoned = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(abandoned.is_err(), "acquire should still be waiting");
    assert_eq!(pool.stats().waiting, 0);

    drop(held);
    let start = Instant::now();
    let _next = pool.acquire().await.expect("acquire after release");
    assert!(start.elapsed() < Duration::from_secs(1));

    let stats = pool.stats();
    assert_eq!(stats.waiting, 0);
    assert_within_capacity(&stats, 1);
}

#[tokio::test]
async fn test_cancelled_max_age_replacement_frees_slot() {
    let factory = Arc::new(SlowConnectionFactory::new(Duration::ZERO));
    let config = PoolConfig::new(1, 1)
        .with_acquire_timeout_ms(10)
        .with_max_age_ms(20);
    let pool = ConnectionPool::new(config, factory.clone())
        .await
        .expect("create pool");

    tokio::time::sleep(Duration::from_millis(40)).await;
    factory.set_delay(Duration::from_millis(200));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
    assert!(abandoned.is_err(), "acquire should still be opening the replacement");

    let stats = pool.stats();
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.available, 0);
    assert_eq!(stats.in_use, 0);

    factory.set_delay(Duration::ZERO);
    let conn = pool.acquire().await.expect("replacement slot should be free again");
    assert!(conn.created_at().elapsed() < Duration::from_millis(20));
    assert_within_capacity(&pool.stats(), 1);
}

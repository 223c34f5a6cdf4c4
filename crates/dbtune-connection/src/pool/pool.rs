//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dbtune_core::{Connection, DbtuneError, Result};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new connection to the engine
    async fn create(&self) -> Result<Arc<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }
}

/// Identifier of a pooled connection, unique within one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Internal wrapper for pooled connections with metadata
struct PooledHandle {
    id: HandleId,
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
    busy: bool,
}

impl PooledHandle {
    fn new(id: HandleId, connection: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used_at: now,
            busy: false,
        }
    }

    fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() > max_age
    }

    fn check_out(&mut self) {
        self.busy = true;
        self.last_used_at = Instant::now();
    }

    fn check_in(&mut self) {
        self.busy = false;
        self.last_used_at = Instant::now();
    }
}

struct PoolState {
    /// Idle connections, oldest release first
    available: VecDeque<PooledHandle>,
    /// Busy connections. The pool keeps its own reference so `close_all` can reach them.
    in_use: HashMap<HandleId, Arc<dyn Connection>>,
    /// Slots claimed by acquirers that are opening a connection outside the lock
    reserved: usize,
    closed: bool,
}

impl PoolState {
    fn tracked(&self) -> usize {
        self.available.len() + self.in_use.len() + self.reserved
    }
}

/// Counts an acquirer in `waiting` for as long as it is alive
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self(waiting)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A slot counted in `PoolState::reserved` while its connection is opened
///
/// Dropping an unfilled reservation gives the slot back, so an acquire that
/// is cancelled mid-open does not shrink the pool.
struct Reservation<'a> {
    pool: &'a ConnectionPool,
    armed: bool,
}

impl<'a> Reservation<'a> {
    /// Claim a slot; the caller already incremented `reserved` under the lock
    fn claimed(pool: &'a ConnectionPool) -> Self {
        Self { pool, armed: true }
    }

    /// Move the slot over to `in_use`. Returns false if the pool closed meanwhile.
    fn fill(mut self, handle: &PooledHandle) -> bool {
        self.armed = false;
        let mut state = self.pool.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        if state.closed {
            return false;
        }
        state.in_use.insert(handle.id, handle.connection.clone());
        true
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.pool.state.lock();
            state.reserved = state.reserved.saturating_sub(1);
            tracing::debug!("connection slot released before it was filled");
        }
    }
}

enum ReleaseOutcome {
    Requeued,
    AfterClose,
    Untracked(PooledHandle),
    Overflow(PooledHandle),
}

/// A bounded pool of database connections shared by concurrent callers
///
/// `acquire` waits up to the configured timeout for an idle connection. Only
/// once that wait expires does the pool open an additional connection, and
/// only while it tracks fewer than `max_size`; otherwise the caller gets
/// [`DbtuneError::PoolExhausted`]. Connections older than `max_age` are
/// replaced when they are handed out. Connections are returned to the pool
/// when the [`PooledConnection`] guard is dropped.
pub struct ConnectionPool {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    /// One permit per connection sitting in `available`
    ready: Semaphore,
    next_id: AtomicU64,
    total_created: AtomicU64,
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    waiting: AtomicUsize,
    invalid_releases: AtomicU64,
    overflow_closes: AtomicU64,
}

impl ConnectionPool {
    /// Create a pool and open `min_size` connections up front
    pub async fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            config,
            factory: Arc::new(factory),
            state: Mutex::new(PoolState {
                available: VecDeque::new(),
                in_use: HashMap::new(),
                reserved: 0,
                closed: false,
            }),
            ready: Semaphore::new(0),
            next_id: AtomicU64::new(1),
            total_created: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            waiting: AtomicUsize::new(0),
            invalid_releases: AtomicU64::new(0),
            overflow_closes: AtomicU64::new(0),
        };

        let mut warm = VecDeque::with_capacity(pool.config.min_size());
        for _ in 0..pool.config.min_size() {
            match pool.create_handle().await {
                Ok(handle) => warm.push_back(handle),
                Err(e) => {
                    tracing::error!(error = %e, opened = warm.len(), "failed to warm connection pool");
                    for handle in warm {
                        let _ = handle.connection.close().await;
                    }
                    return Err(e);
                }
            }
        }

        let warmed = warm.len();
        pool.state.lock().available = warm;
        pool.ready.add_permits(warmed);

        tracing::info!(
            min_size = pool.config.min_size(),
            max_size = pool.config.max_size(),
            acquire_timeout_ms = pool.config.acquire_timeout().as_millis() as u64,
            max_age_ms = pool.config.max_age().as_millis() as u64,
            "connection pool initialized"
        );
        Ok(pool)
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Wait up to `acquire_timeout` for an idle connection, replacing it if
    ///    it is older than `max_age`
    /// 2. If the wait expires and the pool is under `max_size`, open a new connection
    /// 3. Otherwise fail with `PoolExhausted`
    pub async fn acquire(&self) -> Result<PooledConnection<'_>> {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        let timeout = self.config.acquire_timeout();

        let waited = {
            let _waiting = WaitingGuard::enter(&self.waiting);
            tokio::time::timeout(timeout, self.ready.acquire()).await
        };

        let handle = match waited {
            Ok(Ok(permit)) => {
                permit.forget();
                self.check_out_available().await?
            }
            Ok(Err(_)) => return Err(DbtuneError::PoolClosed),
            Err(_) => self.grow(timeout).await?,
        };

        tracing::debug!(handle_id = %handle.id, "connection acquired");
        Ok(PooledConnection {
            handle: Some(handle),
            pool: self,
        })
    }

    /// Take the front idle connection after a permit was granted
    async fn check_out_available(&self) -> Result<PooledHandle> {
        let max_age = self.config.max_age();
        let (mut handle, expired) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(DbtuneError::PoolClosed);
            }
            let Some(handle) = state.available.pop_front() else {
                return Err(DbtuneError::Other(
                    "pool permit granted without an idle connection".into(),
                ));
            };
            let expired = handle.is_expired(max_age);
            if expired {
                // The slot is held as a reservation while the replacement opens.
                state.reserved += 1;
            } else {
                state.in_use.insert(handle.id, handle.connection.clone());
            }
            (handle, expired)
        };

        if !expired {
            handle.check_out();
            self.hits.fetch_add(1, Ordering::SeqCst);
            return Ok(handle);
        }

        let reservation = Reservation::claimed(self);
        self.misses.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            handle_id = %handle.id,
            age_ms = handle.created_at.elapsed().as_millis() as u64,
            "connection exceeded max age, replacing"
        );
        if let Err(e) = handle.connection.close().await {
            tracing::warn!(handle_id = %handle.id, error = %e, "failed to close expired connection");
        }

        self.open_reserved(reservation).await
    }

    /// Open an extra connection after the wait for an idle one expired
    async fn grow(&self, waited: Duration) -> Result<PooledHandle> {
        // A connection may have been released just as the wait ran out.
        if let Ok(permit) = self.ready.try_acquire() {
            permit.forget();
            return self.check_out_available().await;
        }

        let claimed = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(DbtuneError::PoolClosed);
            }
            if state.tracked() < self.config.max_size() {
                state.reserved += 1;
                true
            } else {
                false
            }
        };

        if !claimed {
            tracing::error!(
                max_size = self.config.max_size(),
                waited_ms = waited.as_millis() as u64,
                "connection pool exhausted"
            );
            return Err(DbtuneError::PoolExhausted {
                max_size: self.config.max_size(),
                waited,
            });
        }

        let reservation = Reservation::claimed(self);
        self.misses.fetch_add(1, Ordering::SeqCst);
        self.open_reserved(reservation).await
    }

    /// Open a connection for a reserved slot and check it out
    async fn open_reserved(&self, reservation: Reservation<'_>) -> Result<PooledHandle> {
        let mut handle = self.create_handle().await?;
        handle.check_out();

        if !reservation.fill(&handle) {
            let _ = handle.connection.close().await;
            return Err(DbtuneError::PoolClosed);
        }
        Ok(handle)
    }

    async fn create_handle(&self) -> Result<PooledHandle> {
        let connection = self.factory.create().await?;
        let id = HandleId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let total_created = self.total_created.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(handle_id = %id, total_created, "opened pooled connection");
        Ok(PooledHandle::new(id, connection))
    }

    /// Return a connection to the pool
    fn release(&self, mut handle: PooledHandle) {
        handle.check_in();

        let outcome = {
            let mut state = self.state.lock();
            if state.in_use.remove(&handle.id).is_none() {
                if state.closed {
                    ReleaseOutcome::AfterClose
                } else {
                    ReleaseOutcome::Untracked(handle)
                }
            } else if state.available.len() >= self.config.max_size() {
                ReleaseOutcome::Overflow(handle)
            } else {
                state.available.push_back(handle);
                ReleaseOutcome::Requeued
            }
        };

        match outcome {
            ReleaseOutcome::Requeued => {
                self.ready.add_permits(1);
                tracing::trace!("connection released");
            }
            ReleaseOutcome::AfterClose => {
                self.invalid_releases.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("connection released after the pool was closed");
            }
            ReleaseOutcome::Untracked(handle) => {
                self.invalid_releases.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(handle_id = %handle.id, "released a connection the pool does not track");
                close_detached(handle.connection);
            }
            ReleaseOutcome::Overflow(handle) => {
                // Unreachable while |available| + |in_use| <= max_size holds.
                self.overflow_closes.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    handle_id = %handle.id,
                    max_size = self.config.max_size(),
                    "idle set already full on release, closing connection"
                );
                close_detached(handle.connection);
            }
        }
    }

    /// Close every idle and busy connection
    ///
    /// The pool rejects further acquisitions with `PoolClosed`; construct a new
    /// pool to continue. Guards still held by callers become inert.
    pub async fn close_all(&self) {
        let (idle, busy) = {
            let mut state = self.state.lock();
            state.closed = true;
            let idle: Vec<_> = state.available.drain(..).collect();
            let busy: Vec<_> = state.in_use.drain().map(|(_, conn)| conn).collect();
            (idle, busy)
        };
        self.ready.close();

        let count = idle.len() + busy.len();
        for handle in idle {
            if let Err(e) = handle.connection.close().await {
                tracing::warn!(handle_id = %handle.id, error = %e, "failed to close idle connection");
            }
        }
        for connection in busy {
            if let Err(e) = connection.close().await {
                tracing::warn!(error = %e, "failed to close busy connection");
            }
        }

        tracing::info!(closed = count, "all pooled connections closed");
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let (available, in_use) = {
            let state = self.state.lock();
            (state.available.len(), state.in_use.len())
        };
        PoolStats {
            total_created: self.total_created.load(Ordering::SeqCst),
            total_requests: self.total_requests.load(Ordering::SeqCst),
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            available,
            in_use,
            waiting: self.waiting.load(Ordering::SeqCst),
            invalid_releases: self.invalid_releases.load(Ordering::SeqCst),
            overflow_closes: self.overflow_closes.load(Ordering::SeqCst),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether `close_all` has run
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Close a connection from a synchronous context
fn close_detached(connection: Arc<dyn Connection>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(e) = connection.close().await {
                    tracing::warn!(error = %e, "failed to close discarded connection");
                }
            });
        }
        Err(_) => {
            tracing::debug!("no async runtime available, dropping connection without close");
        }
    }
}

/// A connection borrowed from the pool
///
/// When dropped, the connection is automatically returned to the pool, so
/// every exit path of the borrowing scope releases it exactly once.
pub struct PooledConnection<'a> {
    handle: Option<PooledHandle>,
    pool: &'a ConnectionPool,
}

impl<'a> PooledConnection<'a> {
    fn handle(&self) -> &PooledHandle {
        self.handle.as_ref().expect("connection taken")
    }

    /// Get the pool-assigned identifier
    pub fn id(&self) -> HandleId {
        self.handle().id
    }

    /// When the underlying connection was opened
    pub fn created_at(&self) -> Instant {
        self.handle().created_at
    }

    /// When the connection was last checked out or returned
    pub fn last_used_at(&self) -> Instant {
        self.handle().last_used_at
    }

    /// Whether the pool considers this connection checked out
    pub fn is_busy(&self) -> bool {
        self.handle().busy
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.handle().connection
    }

    /// Return the connection to the pool now instead of at end of scope
    pub fn release(self) {
        drop(self);
    }
}

impl<'a> Deref for PooledConnection<'a> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.handle().connection.as_ref()
    }
}

impl<'a> Drop for PooledConnection<'a> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release(handle);
        }
    }
}

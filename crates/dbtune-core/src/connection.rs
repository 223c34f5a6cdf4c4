//! Connection trait implemented by database engines

use crate::{QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// A live session with a database engine
///
/// Implementations must be safe to move between tasks, but callers are
/// expected to hold a connection exclusively while a statement runs.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query and fully materialize its rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Fetch the engine's execution plan for a query
    ///
    /// The default implementation issues `EXPLAIN QUERY PLAN`; engines with a
    /// different syntax override it.
    async fn explain(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let explain_sql = format!("EXPLAIN QUERY PLAN {}", sql.trim());
        tracing::trace!(explain_sql = %explain_sql, "fetching query plan");
        self.query(&explain_sql, params).await
    }

    /// Commit any open transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back any open transaction
    async fn rollback(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

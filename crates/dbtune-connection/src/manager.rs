//! Scoped, unpooled connections for one-off work

use std::future::Future;
use std::sync::Arc;

use dbtune_core::{Connection, Result, Row, Value};

use crate::pool::ConnectionFactory;

/// Opens a fresh connection per unit of work
///
/// The connection is committed when the work succeeds and rolled back when
/// the work or its commit fails. It is closed in every case.
pub struct ConnectionManager {
    factory: Arc<dyn ConnectionFactory>,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new<F: ConnectionFactory>(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// Run `work` on a dedicated connection
    pub async fn with_connection<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.factory.create().await?;

        let outcome = match work(conn.clone()).await {
            Ok(value) => conn.commit().await.map(|()| value),
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            tracing::error!(error = %e, "scoped connection work failed, rolling back");
            if let Err(rollback_err) = conn.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
        }

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "failed to close scoped connection");
        }
        outcome
    }

    /// Run a single query and return its rows
    #[tracing::instrument(skip(self, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.with_connection(|conn| async move {
            let result = conn.query(sql, params).await?;
            Ok(result.rows)
        })
        .await
    }

    /// Run one statement once per parameter set inside a single transaction
    ///
    /// Returns the total number of affected rows.
    #[tracing::instrument(skip(self, param_sets), fields(sets = param_sets.len()))]
    pub async fn execute_many(&self, sql: &str, param_sets: &[Vec<Value>]) -> Result<u64> {
        self.with_connection(|conn| async move {
            let mut affected = 0;
            for params in param_sets {
                affected += conn.execute(sql, params).await?.affected_rows;
            }
            Ok(affected)
        })
        .await
    }
}

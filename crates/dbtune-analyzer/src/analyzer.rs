//! Query analyzer implementation

use std::sync::Arc;

use chrono::Utc;
use dbtune_core::{ColumnMeta, Connection, Result, Row, Value};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::AnalyzerConfig;
use crate::plan::QueryPlan;
use crate::record::{ComparedQuery, ExplainResult, QueryComparison, QueryRecord, QueryStats};
use crate::timing::timed;


/// Rows of an analyzed execution plus the record it produced
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    pub record: Arc<QueryRecord>,
}

impl QueryAnalysis {
    pub fn execution_time(&self) -> std::time::Duration {
        self.record.execution_time
    }

    pub fn is_slow(&self) -> bool {
        self.record.is_slow
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.record.plan
    }
}

#[derive(Default)]
struct History {
    records: Vec<Arc<QueryRecord>>,
    /// Subset of `records` over the slow threshold
    slow: Vec<Arc<QueryRecord>>,
}

/// Times query executions and keeps their history
///
/// The history is held in memory and grows until [`QueryAnalyzer::reset_stats`].
/// The lock is never held while a query runs.
pub struct QueryAnalyzer {
    config: AnalyzerConfig,
    history: RwLock<History>,
}

impl QueryAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        tracing::info!(
            slow_threshold_ms = config.slow_threshold().as_millis() as u64,
            "query analyzer initialized"
        );
        Self {
            config,
            history: RwLock::new(History::default()),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Execute a query, time it and record the execution
    ///
    /// Engine errors from the query itself are returned unchanged and leave no
    /// record. A failure to fetch the plan only yields an empty plan.
    #[tracing::instrument(skip(self, conn, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn analyze_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryAnalysis> {
        let (result, execution_time) = timed(conn.query(sql, params)).await;
        let result = result?;

        let plan = match conn.explain(sql, params).await {
            Ok(explain) => QueryPlan::from_result(&explain),
            Err(e) => {
                tracing::debug!(error = %e, "plan unavailable, recording empty plan");
                QueryPlan::empty()
            }
        };

        let is_slow = execution_time > self.config.slow_threshold();
        let record = Arc::new(QueryRecord {
            id: Uuid::new_v4(),
            query: sql.to_string(),
            params: params.to_vec(),
            execution_time,
            rows_returned: result.rows.len(),
            is_slow,
            executed_at: Utc::now(),
            plan,
        });

        {
            let mut history = self.history.write();
            history.records.push(record.clone());
            if is_slow {
                history.slow.push(record.clone());
            }
        }

        if is_slow {
            tracing::warn!(
                elapsed_ms = execution_time.as_secs_f64() * 1000.0,
                threshold_ms = self.config.slow_threshold().as_millis() as u64,
                "slow query detected"
            );
        } else {
            tracing::debug!(
                elapsed_ms = execution_time.as_secs_f64() * 1000.0,
                rows = record.rows_returned,
                "query analyzed"
            );
        }

        Ok(QueryAnalysis {
            columns: result.columns,
            rows: result.rows,
            record,
        })
    }

    /// Slow executions in the order they ran
    pub fn get_slow_queries(&self) -> Vec<Arc<QueryRecord>> {
        self.history.read().slow.clone()
    }

    /// Every analyzed execution in the order it ran
    pub fn history(&self) -> Vec<Arc<QueryRecord>> {
        self.history.read().records.clone()
    }

    pub fn get_query_stats(&self) -> QueryStats {
        let history = self.history.read();
        QueryStats::from_history(history.records.iter().map(Arc::as_ref), history.slow.len())
    }

    /// Analyze two queries one after the other and compare their timings
    ///
    /// Both executions are appended to the history.
    pub async fn compare_queries(
        &self,
        conn: &dyn Connection,
        first: (&str, &[Value]),
        second: (&str, &[Value]),
    ) -> Result<QueryComparison> {
        let a = self.analyze_query(conn, first.0, first.1).await?;
        let b = self.analyze_query(conn, second.0, second.1).await?;

        let comparison = QueryComparison::new(compared(&a), compared(&b));
        tracing::info!(
            speedup = comparison.speedup,
            faster = ?comparison.faster,
            "queries compared"
        );
        Ok(comparison)
    }

    /// Fetch a query's plan without running it
    pub async fn explain_query(
        &self,
        conn: &dyn Connection,
        sql: &str,
        params: &[Value],
    ) -> ExplainResult {
        match conn.explain(sql, params).await {
            Ok(result) => ExplainResult {
                query: sql.to_string(),
                plan: Some(QueryPlan::from_result(&result)),
                error: None,
            },
            Err(e) => {
                tracing::error!(error = %e, "error explaining query");
                ExplainResult {
                    query: sql.to_string(),
                    plan: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Drop the history and slow list
    pub fn reset_stats(&self) {
        let mut history = self.history.write();
        history.records.clear();
        history.slow.clear();
        tracing::info!("query analyzer stats reset");
    }
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

fn compared(analysis: &QueryAnalysis) -> ComparedQuery {
    ComparedQuery {
        query: analysis.record.query.clone(),
        execution_time: analysis.record.execution_time,
        rows: analysis.record.rows_returned,
    }
}

//! Execution records and derived reports

use std::time::Duration;

use chrono::{DateTime, Utc};
use dbtune_core::Value;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::plan::QueryPlan;

pub(crate) fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

/// One analyzed execution. Never mutated after it is recorded.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub id: Uuid,
    pub query: String,
    pub params: Vec<Value>,
    /// Time to execute the query and materialize every row
    #[serde(rename = "execution_time_ms", serialize_with = "as_millis")]
    pub execution_time: Duration,
    pub rows_returned: usize,
    pub is_slow: bool,
    pub executed_at: DateTime<Utc>,
    /// Empty when the engine could not explain the query
    pub plan: QueryPlan,
}

/// Aggregates over the analyzer history
///
/// All fields are zero when nothing has been analyzed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryStats {
    pub total_queries: usize,
    pub slow_queries: usize,
    /// Slow share of the history, as a percentage
    pub slow_query_percentage: f64,
    #[serde(rename = "avg_execution_time_ms", serialize_with = "as_millis")]
    pub avg_execution_time: Duration,
    #[serde(rename = "min_execution_time_ms", serialize_with = "as_millis")]
    pub min_execution_time: Duration,
    #[serde(rename = "max_execution_time_ms", serialize_with = "as_millis")]
    pub max_execution_time: Duration,
}

impl QueryStats {
    pub(crate) fn from_history<'a>(
        history: impl ExactSizeIterator<Item = &'a QueryRecord>,
        slow_queries: usize,
    ) -> Self {
        let total_queries = history.len();
        if total_queries == 0 {
            return Self::default();
        }

        let mut total = Duration::ZERO;
        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;
        for record in history {
            total += record.execution_time;
            min = min.min(record.execution_time);
            max = max.max(record.execution_time);
        }

        Self {
            total_queries,
            slow_queries,
            slow_query_percentage: slow_queries as f64 / total_queries as f64 * 100.0,
            avg_execution_time: total / total_queries as u32,
            min_execution_time: min,
            max_execution_time: max,
        }
    }
}

/// Which side of a comparison ran faster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FasterQuery {
    First,
    Second,
}

/// One side of a [`QueryComparison`]
#[derive(Debug, Clone, Serialize)]
pub struct ComparedQuery {
    pub query: String,
    #[serde(rename = "execution_time_ms", serialize_with = "as_millis")]
    pub execution_time: Duration,
    pub rows: usize,
}

/// Result of timing two queries back to back
#[derive(Debug, Clone, Serialize)]
pub struct QueryComparison {
    pub first: ComparedQuery,
    pub second: ComparedQuery,
    /// First time divided by second time, 0 when the second took no measurable time
    pub speedup: f64,
    /// Ties go to the first query
    pub faster: FasterQuery,
}

impl QueryComparison {
    pub(crate) fn new(first: ComparedQuery, second: ComparedQuery) -> Self {
        let t1 = first.execution_time.as_secs_f64();
        let t2 = second.execution_time.as_secs_f64();
        let speedup = if t2 > 0.0 { t1 / t2 } else { 0.0 };
        let faster = if second.execution_time < first.execution_time {
            FasterQuery::Second
        } else {
            FasterQuery::First
        };
        Self {
            first,
            second,
            speedup,
            faster,
        }
    }
}

/// Outcome of asking the engine for a plan
///
/// Exactly one of `plan` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ExplainResult {
    pub query: String,
    pub plan: Option<QueryPlan>,
    pub error: Option<String>,
}

impl ExplainResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

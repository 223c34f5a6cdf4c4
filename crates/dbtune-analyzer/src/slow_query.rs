//! Standalone slow-query log

use std::time::Duration;

use chrono::{DateTime, Utc};
use dbtune_core::Value;
use parking_lot::Mutex;
use serde::Serialize;

use crate::record::as_millis;

/// A query that ran longer than the detector threshold
#[derive(Debug, Clone, Serialize)]
pub struct SlowQueryEntry {
    pub query: String,
    pub params: Vec<Value>,
    #[serde(rename = "execution_time_ms", serialize_with = "as_millis")]
    pub execution_time: Duration,
    pub detected_at: DateTime<Utc>,
}

/// Collects executions that exceed a threshold
///
/// Unlike [`QueryAnalyzer`](crate::QueryAnalyzer) it never runs queries; callers
/// report timings they measured themselves.
pub struct SlowQueryDetector {
    threshold: Duration,
    entries: Mutex<Vec<SlowQueryEntry>>,
}

impl SlowQueryDetector {
    pub fn new(threshold: Duration) -> Self {
        tracing::info!(threshold_ms = threshold.as_millis() as u64, "slow query detector initialized");
        Self {
            threshold,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Record the execution if it was slow. Returns whether it was.
    pub fn detect(&self, query: &str, execution_time: Duration, params: &[Value]) -> bool {
        if execution_time <= self.threshold {
            return false;
        }

        tracing::warn!(
            elapsed_ms = execution_time.as_secs_f64() * 1000.0,
            query = %query.chars().take(100).collect::<String>(),
            "slow query"
        );
        self.entries.lock().push(SlowQueryEntry {
            query: query.to_string(),
            params: params.to_vec(),
            execution_time,
            detected_at: Utc::now(),
        });
        true
    }

    /// The most recent `limit` slow queries, oldest first, or all of them
    pub fn slow_queries(&self, limit: Option<usize>) -> Vec<SlowQueryEntry> {
        let entries = self.entries.lock();
        let skip = match limit {
            Some(limit) => entries.len().saturating_sub(limit),
            None => 0,
        };
        entries[skip..].to_vec()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        tracing::info!("slow query log cleared");
    }
}

//! Analyzer configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`QueryAnalyzer`](crate::QueryAnalyzer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Executions strictly longer than this are classified as slow
    slow_threshold_ms: u64,
}

impl AnalyzerConfig {
    pub fn new(slow_threshold_ms: u64) -> Self {
        Self { slow_threshold_ms }
    }

    pub fn with_slow_threshold_ms(mut self, slow_threshold_ms: u64) -> Self {
        self.slow_threshold_ms = slow_threshold_ms;
        self
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

impl Default for AnalyzerConfig {
    /// One second slow-query threshold
    fn default() -> Self {
        Self::new(1000)
    }
}

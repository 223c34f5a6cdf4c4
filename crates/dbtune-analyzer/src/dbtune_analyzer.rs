//! dbtune Analyzer - Query timing and plan inspection
//!
//! This crate provides functionality for:
//! - Timing query execution and classifying slow queries
//! - Keeping an in-memory execution history with aggregate statistics
//! - Parsing SQLite `EXPLAIN QUERY PLAN` rows into a structured plan

mod analyzer;
mod config;
pub mod plan;
mod record;
mod slow_query;
mod timing;

pub use analyzer::{QueryAnalysis, QueryAnalyzer};
pub use config::AnalyzerConfig;
pub use plan::{PlanStep, QueryPlan, StepKind};
pub use record::{ComparedQuery, ExplainResult, FasterQuery, QueryComparison, QueryRecord, QueryStats};
pub use slow_query::{SlowQueryDetector, SlowQueryEntry};
pub use timing::{timed, timed_with_threshold};

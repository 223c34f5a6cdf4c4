//! Terminal rendering of results and statistics

use std::time::Duration;

use comfy_table::{Cell, Color, ContentArrangement, Table};
use dbtune_analyzer::{ExplainResult, FasterQuery, QueryComparison};
use dbtune_core::{Row, Value};
use dbtune_services::ServiceStats;
use serde_json::{Value as JsonValue, json};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        header
            .into_iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );
    table
}

pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

pub fn rows_table(columns: &[String], rows: &[Row]) -> Table {
    let mut table = new_table(columns.iter().map(String::as_str).collect());
    for row in rows {
        table.add_row(row.values.iter().map(Value::to_string).collect::<Vec<_>>());
    }
    table
}

pub fn stats_table(stats: &ServiceStats) -> Table {
    let mut table = new_table(vec!["Component", "Metric", "Value"]);

    let pool = &stats.pool;
    let cache = &stats.cache;
    let analyzer = &stats.analyzer;
    let lines: Vec<(&str, &str, String)> = vec![
        ("pool", "total connections", pool.total_connections().to_string()),
        ("pool", "available", pool.available.to_string()),
        ("pool", "in use", pool.in_use.to_string()),
        ("pool", "total created", pool.total_created.to_string()),
        ("pool", "requests", pool.total_requests.to_string()),
        ("pool", "hit rate", format!("{:.1}%", pool.hit_rate())),
        ("cache", "entries", format!("{}/{}", cache.cache_size, cache.max_size)),
        ("cache", "ttl", format!("{} ms", cache.ttl_ms)),
        ("cache", "hits", cache.hits.to_string()),
        ("cache", "misses", cache.misses.to_string()),
        ("cache", "evictions", cache.evictions.to_string()),
        ("cache", "hit rate", format!("{:.1}%", cache.hit_rate())),
        ("analyzer", "queries", analyzer.total_queries.to_string()),
        (
            "analyzer",
            "slow",
            format!(
                "{} ({:.1}%)",
                analyzer.slow_queries, analyzer.slow_query_percentage
            ),
        ),
        (
            "analyzer",
            "avg time",
            format!("{:.3} ms", millis(analyzer.avg_execution_time)),
        ),
        (
            "analyzer",
            "min / max",
            format!(
                "{:.3} / {:.3} ms",
                millis(analyzer.min_execution_time),
                millis(analyzer.max_execution_time)
            ),
        ),
        ("writes", "slow", stats.slow_writes.to_string()),
    ];

    for (component, metric, value) in lines {
        table.add_row(vec![component, metric, value.as_str()]);
    }
    table
}

pub fn comparison_table(comparison: &QueryComparison) -> Table {
    let mut table = new_table(vec!["", "Query", "Time (ms)", "Rows"]);
    for (label, side, faster) in [
        ("first", &comparison.first, comparison.faster == FasterQuery::First),
        ("second", &comparison.second, comparison.faster == FasterQuery::Second),
    ] {
        let label = if faster {
            Cell::new(format!("{label} *")).fg(Color::Green)
        } else {
            Cell::new(label)
        };
        table.add_row(vec![
            label,
            Cell::new(&side.query),
            Cell::new(format!("{:.3}", millis(side.execution_time))),
            Cell::new(side.rows),
        ]);
    }
    table
}

/// Render an explain result as text, one plan step per line
pub fn explain_text(result: &ExplainResult) -> String {
    match (&result.plan, &result.error) {
        (Some(plan), _) if plan.is_empty() => "(empty plan)".to_string(),
        (Some(plan), _) => plan.to_string(),
        (None, Some(error)) => format!("error: {error}"),
        (None, None) => String::new(),
    }
}

/// Plain JSON for a cell, without the enum tag
pub fn value_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => json!(v),
        Value::Int32(v) => json!(v),
        Value::Int64(v) => json!(v),
        Value::Float64(v) => json!(v),
        Value::Json(v) => v.clone(),
        other => json!(other.to_string()),
    }
}

pub fn rows_json(rows: &[Row]) -> JsonValue {
    JsonValue::Array(
        rows.iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .zip(&row.values)
                    .map(|(name, value)| (name.clone(), value_json(value)))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            })
            .collect(),
    )
}

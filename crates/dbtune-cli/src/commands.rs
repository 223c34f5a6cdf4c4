//! Subcommand implementations

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use dbtune_core::Value;
use dbtune_driver_sqlite::SqliteConnectionFactory;
use dbtune_services::{QueryService, ServiceConfig, ServiceStats};
use serde_json::json;

use crate::output;

async fn start(config: ServiceConfig) -> Result<QueryService> {
    let factory = SqliteConnectionFactory::new(config.database.clone());
    let database = config.database.clone();
    QueryService::start(config, factory)
        .await
        .with_context(|| format!("starting query service for {database}"))
}

fn print_stats(stats: &ServiceStats) {
    println!("{}", output::stats_table(stats));
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn query(
    config: ServiceConfig,
    sql: &str,
    params: &[Value],
    repeat: u32,
    json: bool,
) -> Result<()> {
    let service = start(config).await?;

    let mut runs = Vec::new();
    let mut last = None;
    for _ in 0..repeat.max(1) {
        let result = service.cached_query(sql, params).await?;
        runs.push((result.cached, result.execution_time, result.is_slow));
        last = Some(result);
    }
    let stats = service.stats();
    service.shutdown().await;

    let Some(last) = last else {
        return Ok(());
    };

    if json {
        let runs: Vec<_> = runs
            .iter()
            .map(|(cached, elapsed, slow)| {
                json!({
                    "cached": cached,
                    "execution_time_ms": output::millis(*elapsed),
                    "is_slow": slow,
                })
            })
            .collect();
        return print_json(&json!({
            "rows": output::rows_json(&last.rows),
            "runs": runs,
            "stats": stats,
        }));
    }

    println!("{}", output::rows_table(&last.column_names(), &last.rows));
    println!("{} row(s)", last.row_count());
    for (i, (cached, elapsed, slow)) in runs.iter().enumerate() {
        let source = if *cached { "cache" } else { "database" };
        let slow = if *slow { " (slow)" } else { "" };
        println!(
            "run {}: {} in {:.3} ms{}",
            i + 1,
            source,
            output::millis(*elapsed),
            slow
        );
    }
    print_stats(&stats);
    Ok(())
}

pub async fn exec(
    config: ServiceConfig,
    sql: &str,
    params: &[Value],
    table: &str,
    json: bool,
) -> Result<()> {
    let service = start(config).await?;
    let affected = service.execute_write(sql, params, table).await;
    service.shutdown().await;
    let affected = affected?;

    if json {
        print_json(&json!({ "affected_rows": affected, "table": table }))
    } else {
        println!("{affected} row(s) affected in {table}; cache invalidated");
        Ok(())
    }
}

pub async fn explain(config: ServiceConfig, sql: &str, params: &[Value], json: bool) -> Result<()> {
    let service = start(config).await?;
    let result = service.explain(sql, params).await;
    service.shutdown().await;
    let result = result?;

    if json {
        print_json(&serde_json::to_value(&result)?)?;
    } else {
        println!("{}", output::explain_text(&result));
        let full_scans = result
            .plan
            .as_ref()
            .map(|plan| plan.scanned_tables())
            .unwrap_or_default();
        if !full_scans.is_empty() {
            println!("full scan of: {}", full_scans.join(", "));
        }
    }

    match result.error {
        Some(error) => bail!("could not explain query: {error}"),
        None => Ok(()),
    }
}

pub async fn compare(
    config: ServiceConfig,
    first: (&str, &[Value]),
    second: (&str, &[Value]),
    json: bool,
) -> Result<()> {
    let service = start(config).await?;
    let comparison = service.compare(first, second).await;
    service.shutdown().await;
    let comparison = comparison?;

    if json {
        return print_json(&serde_json::to_value(&comparison)?);
    }

    println!("{}", output::comparison_table(&comparison));
    println!("speedup: {:.2}x", comparison.speedup);
    Ok(())
}

/// Shape of a bench run
#[derive(Debug, Clone, Copy)]
pub struct BenchPlan {
    pub tasks: usize,
    pub iterations: usize,
    pub no_cache: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct BenchTally {
    ok: u64,
    cached: u64,
    exhausted: u64,
    failed: u64,
}

impl BenchTally {
    fn merge(&mut self, other: BenchTally) {
        self.ok += other.ok;
        self.cached += other.cached;
        self.exhausted += other.exhausted;
        self.failed += other.failed;
    }
}

pub async fn bench(
    config: ServiceConfig,
    sql: String,
    params: Vec<Value>,
    plan: BenchPlan,
    json: bool,
) -> Result<()> {
    let service = Arc::new(start(config).await?);
    let sql: Arc<str> = sql.into();
    let params: Arc<[Value]> = params.into();

    let BenchPlan {
        tasks,
        iterations,
        no_cache,
    } = plan;
    tracing::info!(tasks, iterations, no_cache, "bench started");
    let started = Instant::now();

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let service = service.clone();
            let sql = sql.clone();
            let params = params.clone();
            tokio::spawn(async move {
                let mut tally = BenchTally::default();
                for _ in 0..iterations {
                    if no_cache {
                        service.clear_cache();
                    }
                    match service.cached_query(&sql, &params).await {
                        Ok(result) => {
                            tally.ok += 1;
                            if result.cached {
                                tally.cached += 1;
                            }
                        }
                        Err(e) if e.is_pool_exhausted() => tally.exhausted += 1,
                        Err(e) => {
                            tracing::warn!(error = %e, "bench query failed");
                            tally.failed += 1;
                        }
                    }
                }
                tally
            })
        })
        .collect();

    let mut total = BenchTally::default();
    for handle in handles {
        total.merge(handle.await.context("bench task panicked")?);
    }
    let elapsed = started.elapsed();
    let stats = service.stats();
    service.shutdown().await;

    let requests = total.ok + total.exhausted + total.failed;
    let throughput = if elapsed.is_zero() {
        0.0
    } else {
        requests as f64 / elapsed.as_secs_f64()
    };

    if json {
        return print_json(&json!({
            "tasks": tasks,
            "iterations": iterations,
            "requests": requests,
            "ok": total.ok,
            "cached": total.cached,
            "exhausted": total.exhausted,
            "failed": total.failed,
            "elapsed_ms": output::millis(elapsed),
            "queries_per_sec": throughput,
            "stats": stats,
        }));
    }

    println!(
        "{requests} request(s) from {} task(s) in {:.1} ms ({throughput:.0}/s)",
        tasks,
        output::millis(elapsed)
    );
    println!(
        "ok: {}, from cache: {}, pool exhausted: {}, failed: {}",
        total.ok, total.cached, total.exhausted, total.failed
    );
    print_stats(&stats);
    Ok(())
}

//! dbtune - run SQLite queries through a pool, a result cache and an analyzer

mod commands;
mod logging;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbtune_core::Value;
use dbtune_services::ServiceConfig;

use logging::LoggingConfig;

#[derive(Debug, Parser)]
#[command(name = "dbtune")]
#[command(version, about = "Run SQLite queries through a connection pool, a result cache and a query analyzer", long_about = None)]
struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(short, long, env = "DBTUNE_DATABASE", global = true)]
    database: Option<String>,

    /// TOML configuration file
    #[arg(short, long, env = "DBTUNE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Slow query threshold in milliseconds (overrides the config file)
    #[arg(long, global = true)]
    slow_ms: Option<u64>,

    /// Print results and statistics as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log pool, cache and analyzer activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Do not write JSON log files
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a read through the cache, repeating it to show cache hits
    Query {
        sql: String,

        /// Bound parameter, in order (repeatable); NULL and numbers are recognised
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Number of times to run the query
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
    },

    /// Run a write, commit it and invalidate the cache
    Exec {
        sql: String,

        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Table the statement modifies
        #[arg(short, long)]
        table: String,
    },

    /// Show the query plan without running the query
    Explain {
        sql: String,

        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Time two queries back to back
    Compare {
        first: String,
        second: String,

        /// Parameter for the first query (repeatable)
        #[arg(long = "first-param")]
        first_params: Vec<String>,

        /// Parameter for the second query (repeatable)
        #[arg(long = "second-param")]
        second_params: Vec<String>,
    },

    /// Hammer one query from concurrent tasks sharing the pool and cache
    Bench {
        sql: String,

        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Concurrent tasks
        #[arg(long, default_value_t = 8)]
        tasks: usize,

        /// Queries per task
        #[arg(long, default_value_t = 50)]
        iterations: usize,

        /// Clear the cache before every query so each one reaches the pool
        #[arg(long)]
        no_cache: bool,
    },
}

fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|p| Value::parse_literal(p)).collect()
}

impl Cli {
    /// Merge the config file, flags and environment into one service config
    fn service_config(&self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(database) = &self.database {
            config = config.with_database(database.clone());
        }
        if let Some(slow_ms) = self.slow_ms {
            config.analyzer = config.analyzer.with_slow_threshold_ms(slow_ms);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging_config = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    logging_config.enable_json_logs = !cli.no_log_file;
    let _log_guard = logging::init(logging_config)?;

    let config = cli.service_config()?;
    let json = cli.json;

    match cli.command {
        Command::Query {
            sql,
            params,
            repeat,
        } => commands::query(config, &sql, &parse_params(&params), repeat, json).await,
        Command::Exec { sql, params, table } => {
            commands::exec(config, &sql, &parse_params(&params), &table, json).await
        }
        Command::Explain { sql, params } => {
            commands::explain(config, &sql, &parse_params(&params), json).await
        }
        Command::Compare {
            first,
            second,
            first_params,
            second_params,
        } => {
            let first_params = parse_params(&first_params);
            let second_params = parse_params(&second_params);
            commands::compare(
                config,
                (&first, &first_params),
                (&second, &second_params),
                json,
            )
            .await
        }
        Command::Bench {
            sql,
            params,
            tasks,
            iterations,
            no_cache,
        } => {
            let plan = commands::BenchPlan {
                tasks,
                iterations,
                no_cache,
            };
            commands::bench(config, sql, parse_params(&params), plan, json).await
        }
    }
}

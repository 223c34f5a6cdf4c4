//! Common test utilities and mocks

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dbtune_connection::ConnectionFactory;
use dbtune_core::{
    ColumnMeta, Connection, DbtuneError, QueryResult, Result, Row, StatementResult, Value,
};
use parking_lot::Mutex;

/// Mock connection for exercising the service flow without a database.
///
/// Statements mentioning `missing` fail like an unknown table would. Every
/// call is appended to a log shared by all connections of one factory.
pub struct MockConnection {
    log: Arc<Mutex<Vec<String>>>,
    fail_commits: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl MockConnection {
    fn record(&self, entry: impl Into<String>) {
        self.log.lock().push(entry.into());
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.record(sql);
        if sql.contains("missing") {
            return Err(DbtuneError::Query("no such table: missing".into()));
        }
        Ok(StatementResult { affected_rows: 1 })
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.record(sql);
        if sql.contains("missing") {
            return Err(DbtuneError::Query("no such table: missing".into()));
        }

        if sql.starts_with("EXPLAIN QUERY PLAN") {
            let row = Row::new(
                vec!["id".into(), "parent".into(), "notused".into(), "detail".into()],
                vec![
                    Value::Int64(2),
                    Value::Int64(0),
                    Value::Int64(0),
                    Value::from("SCAN users"),
                ],
            );
            return Ok(QueryResult::from_rows(Vec::new(), vec![row]));
        }

        // Echo the first parameter so distinct params give distinct rows.
        let echoed = params.first().cloned().unwrap_or(Value::Null);
        let columns = vec![ColumnMeta {
            name: "value".into(),
            data_type: "TEXT".into(),
            ordinal: 0,
        }];
        let rows = vec![
            Row::new(vec!["value".into()], vec![echoed.clone()]),
            Row::new(vec!["value".into()], vec![echoed]),
        ];
        Ok(QueryResult::from_rows(columns, rows))
    }

    async fn commit(&self) -> Result<()> {
        self.record("COMMIT");
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DbtuneError::Query("database is locked".into()));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory handing out [`MockConnection`]s that share one call log
#[derive(Default)]
pub struct MockFactory {
    log: Arc<Mutex<Vec<String>>>,
    fail_commits: Arc<AtomicBool>,
    created: AtomicUsize,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Logged statements that start with `prefix`
    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|s| s.starts_with(prefix)).count()
    }

    /// Make every later `commit` fail as if the database were locked
    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            log: self.log.clone(),
            fail_commits: self.fail_commits.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

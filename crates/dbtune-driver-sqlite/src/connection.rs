//! SQLite connection implementation

use async_trait::async_trait;
use dbtune_core::{
    ColumnMeta, Connection, DbtuneError, QueryResult, Result, Row, StatementResult, Value,
};
use parking_lot::Mutex;
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};

/// SQLite connection wrapper
///
/// Data-modifying statements run inside an implicit transaction that stays
/// open until [`Connection::commit`] or [`Connection::rollback`]. Queries
/// run in autocommit mode unless such a transaction is already open.
pub struct SqliteConnection {
    /// `None` once closed
    conn: Mutex<Option<RusqliteConnection>>,
    path: String,
}

impl SqliteConnection {
    /// Open a SQLite database
    pub fn open(path: &str) -> Result<Self> {
        tracing::info!(path = %path, "opening SQLite database");
        let expanded_path = Self::expand_path(path)?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let in_memory = path == ":memory:";
        let conn = if in_memory {
            RusqliteConnection::open_in_memory().map_err(|e| {
                DbtuneError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            if !expanded_path.starts_with("file:") {
                let file_path = std::path::Path::new(&expanded_path);
                if let Some(parent) = file_path.parent() {
                    if !parent.exists() {
                        return Err(DbtuneError::Connection(format!(
                            "Parent directory does not exist: {}",
                            parent.display()
                        )));
                    }
                }
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                DbtuneError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON").map_err(|e| {
            DbtuneError::Connection(format!("Failed to enable foreign keys: {}", e))
        })?;

        // WAL lets pooled readers proceed while one handle writes.
        if !in_memory {
            conn.pragma_update(None, "journal_mode", "WAL").map_err(|e| {
                DbtuneError::Connection(format!("Failed to set journal mode: {}", e))
            })?;
            conn.pragma_update(None, "synchronous", "NORMAL").map_err(|e| {
                DbtuneError::Connection(format!("Failed to set synchronous mode: {}", e))
            })?;
        }

        tracing::debug!(path = %expanded_path, "SQLite database connection established");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: expanded_path,
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// The resolved database path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Expand path to handle ~ (home directory) and relative paths
    fn expand_path(path: &str) -> Result<String> {
        if path == ":memory:" || path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest).to_string_lossy().to_string(),
                None => {
                    return Err(DbtuneError::Configuration(
                        "Unable to determine HOME directory".into(),
                    ));
                }
            }
        } else if path.starts_with('~') {
            return Err(DbtuneError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            path.to_string()
        };

        let path_buf = std::path::PathBuf::from(&expanded);
        let result = if path_buf.is_relative() {
            std::env::current_dir()
                .map_err(DbtuneError::Io)?
                .join(path_buf)
                .to_string_lossy()
                .to_string()
        } else {
            expanded
        };

        Ok(result)
    }

    /// Run a statement batch without parameters, e.g. a schema script
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!("executing SQL batch");
        let guard = self.conn.lock();
        let conn = open_conn(&guard)?;
        conn.execute_batch(sql)
            .map_err(|e| DbtuneError::Query(format!("Failed to execute batch: {}", e)))
    }

    /// Whether a transaction is currently open on this connection
    pub fn in_transaction(&self) -> bool {
        self.conn
            .lock()
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }

    fn finish_transaction(&self, statement: &str) -> Result<()> {
        let guard = self.conn.lock();
        let conn = open_conn(&guard)?;
        if conn.is_autocommit() {
            return Ok(());
        }
        conn.execute_batch(statement)
            .map_err(|e| DbtuneError::Query(format!("Failed to {}: {}", statement, e)))?;
        tracing::debug!(statement, "SQLite transaction finished");
        Ok(())
    }
}

fn open_conn(guard: &Option<RusqliteConnection>) -> Result<&RusqliteConnection> {
    guard
        .as_ref()
        .ok_or_else(|| DbtuneError::Connection("connection is closed".into()))
}

/// Statements that change data get an implicit transaction
fn starts_implicit_transaction(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    matches!(keyword.as_str(), "INSERT" | "UPDATE" | "DELETE" | "REPLACE")
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let guard = self.conn.lock();
        let conn = open_conn(&guard)?;
        let rusqlite_params = values_to_rusqlite(params);

        if starts_implicit_transaction(sql) && conn.is_autocommit() {
            conn.execute_batch("BEGIN DEFERRED")
                .map_err(|e| DbtuneError::Query(format!("Failed to begin transaction: {}", e)))?;
        }

        let rows_affected = conn
            .execute(sql, params_from_iter(rusqlite_params.iter()))
            .map_err(|e| DbtuneError::Query(format!("Failed to execute statement: {}", e)))?;

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult {
            affected_rows: rows_affected as u64,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();

        let guard = self.conn.lock();
        let conn = open_conn(&guard)?;
        let rusqlite_params = values_to_rusqlite(params);

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DbtuneError::Query(format!("Failed to prepare query: {}", e)))?;

        let column_count = stmt.column_count();
        let mut column_names: Vec<String> = Vec::with_capacity(column_count);
        let mut columns: Vec<ColumnMeta> = Vec::with_capacity(column_count);

        for (idx, col) in stmt.columns().iter().enumerate() {
            let name = col.name().to_string();
            // Declared type from CREATE TABLE, if the column maps to one
            let data_type = col.decl_type().unwrap_or("DYNAMIC").to_string();

            column_names.push(name.clone());
            columns.push(ColumnMeta {
                name,
                data_type,
                ordinal: idx,
            });
        }

        let mut rows = Vec::new();
        let mut query_rows = stmt
            .query(params_from_iter(rusqlite_params.iter()))
            .map_err(|e| DbtuneError::Query(format!("Failed to execute query: {}", e)))?;

        while let Some(row) = query_rows
            .next()
            .map_err(|e| DbtuneError::Query(format!("Failed to fetch row: {}", e)))?
        {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(rusqlite_to_value(row, i)?);
            }
            rows.push(Row::new(column_names.clone(), values));
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        let mut result = QueryResult::from_rows(columns, rows);
        result.execution_time_ms = execution_time_ms;
        Ok(result)
    }

    async fn commit(&self) -> Result<()> {
        self.finish_transaction("COMMIT")
    }

    async fn rollback(&self) -> Result<()> {
        self.finish_transaction("ROLLBACK")
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        tracing::debug!(path = %self.path, "closing SQLite connection");
        conn.close()
            .map_err(|(_, e)| DbtuneError::Connection(format!("Failed to close connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

fn values_to_rusqlite(values: &[Value]) -> Vec<rusqlite::types::Value> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Int32(i) => rusqlite::types::Value::Integer(*i as i64),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::Decimal(d) => rusqlite::types::Value::Text(d.clone()),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::DateTimeUtc(dt) => rusqlite::types::Value::Text(dt.to_rfc3339()),
        Value::Json(j) => rusqlite::types::Value::Text(j.to_string()),
        Value::Uuid(u) => rusqlite::types::Value::Text(u.to_string()),
    }
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| DbtuneError::Query(e.to_string()))?;

    let value = match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_implicit_transaction_keywords() {
        assert!(starts_implicit_transaction("INSERT INTO t VALUES (1)"));
        assert!(starts_implicit_transaction("  update t set a = 1"));
        assert!(starts_implicit_transaction("DELETE FROM t"));
        assert!(!starts_implicit_transaction("SELECT 1"));
        assert!(!starts_implicit_transaction("CREATE TABLE t (a)"));
        assert!(!starts_implicit_transaction(""));
    }

    #[test]
    fn test_expand_path_keeps_special_paths() {
        assert_eq!(SqliteConnection::expand_path(":memory:").expect("memory"), ":memory:");
        assert_eq!(
            SqliteConnection::expand_path("file:test.db?mode=ro").expect("uri"),
            "file:test.db?mode=ro"
        );
        assert!(SqliteConnection::expand_path("~alice/db.sqlite").is_err());
        assert!(std::path::Path::new(&SqliteConnection::expand_path("rel.db").expect("relative")).is_absolute());
    }

    #[tokio::test]
    async fn test_query_in_memory() {
        let conn = SqliteConnection::open_in_memory().expect("open");
        let result = conn
            .query("SELECT 1 AS one, 'x' AS letter, NULL AS nothing", &[])
            .await
            .expect("query");

        assert_eq!(result.column_count(), 3);
        assert_eq!(result.columns[0].name, "one");
        let row = &result.rows[0];
        assert_eq!(row.get_by_name("one"), Some(&Value::Int64(1)));
        assert_eq!(row.get_by_name("letter"), Some(&Value::from("x")));
        assert_eq!(row.get_by_name("nothing"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_use() {
        let conn = SqliteConnection::open_in_memory().expect("open");
        conn.close().await.expect("close");
        conn.close().await.expect("close again");
        assert!(conn.is_closed());

        let err = conn.query("SELECT 1", &[]).await.expect_err("closed");
        assert!(matches!(err, DbtuneError::Connection(_)));
    }
}

//! Connection factory for pools and scoped connections

use std::sync::Arc;

use async_trait::async_trait;
use dbtune_connection::ConnectionFactory;
use dbtune_core::{Connection, Result};

use crate::SqliteConnection;

/// Opens a new [`SqliteConnection`] to the same database for every request
///
/// With `:memory:` every connection gets its own private database.
#[derive(Debug, Clone)]
pub struct SqliteConnectionFactory {
    path: String,
}

impl SqliteConnectionFactory {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl ConnectionFactory for SqliteConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let conn = SqliteConnection::open(&self.path)?;
        Ok(Arc::new(conn))
    }
}

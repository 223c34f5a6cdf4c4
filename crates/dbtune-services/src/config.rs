//! Service configuration loaded from TOML
//!
//! Every section is optional; missing keys fall back to the component
//! defaults.
//!
//! ```toml
//! database = "shop.db"
//!
//! [pool]
//! min_size = 2
//! max_size = 5
//! acquire_timeout_ms = 5000
//!
//! [cache]
//! ttl_ms = 60000
//!
//! [analyzer]
//! slow_threshold_ms = 100
//! ```

use std::path::Path;

use dbtune_analyzer::AnalyzerConfig;
use dbtune_cache::CacheConfig;
use dbtune_connection::PoolConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// Default database file, relative to the working directory
pub const DEFAULT_DATABASE: &str = "dbtune.db";

/// Configuration for a [`QueryService`](crate::QueryService)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Database location handed to the connection factory
    pub database: String,
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub analyzer: AnalyzerConfig,
}

impl ServiceConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(content: &str) -> ServiceResult<Self> {
        let config: ServiceConfig =
            toml::from_str(content).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_toml_str(&content).map_err(|e| match e {
            ServiceError::Config(msg) => {
                ServiceError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        tracing::info!(path = %path.display(), database = %config.database, "configuration loaded");
        Ok(config)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn validate(&self) -> ServiceResult<()> {
        if self.database.trim().is_empty() {
            return Err(ServiceError::Config("database must not be empty".into()));
        }
        self.pool.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            pool: PoolConfig::default(),
            cache: CacheConfig::default(),
            analyzer: AnalyzerConfig::default(),
        }
    }
}

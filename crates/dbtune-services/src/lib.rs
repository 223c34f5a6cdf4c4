//! dbtune Services Layer
//!
//! This crate sits between request-handling code (the CLI) and the pooling,
//! caching and analysis crates.
//!
//! # Architecture
//!
//! ```text
//! dbtune-cli
//!     ↓
//! dbtune-services ← This crate
//!     ↓
//! dbtune-connection, dbtune-cache, dbtune-analyzer
//!     ↓
//! dbtune-core, dbtune-driver-sqlite
//! ```
//!
//! A read first probes the cache; on a miss it borrows a pooled connection,
//! runs the query through the analyzer, returns the connection and stores
//! the rows. Writes commit and then invalidate the cache.

mod config;
mod error;
mod query_service;

pub use config::{DEFAULT_DATABASE, ServiceConfig};
pub use error::{ServiceError, ServiceResult};
pub use query_service::{CachedQueryResult, QUERY_CACHE, QueryService, ServiceStats};

//! dbtune core - Shared abstractions for the pooling, caching and analysis crates
//!
//! This crate defines:
//!
//! - `Connection` - The handle trait every database engine implements
//! - `Value`, `Row`, `QueryResult` - Parameter and result types
//! - `DbtuneError` - The error taxonomy shared across the workspace

mod connection;
mod error;
mod types;

pub use connection::*;
pub use error::*;
pub use types::*;

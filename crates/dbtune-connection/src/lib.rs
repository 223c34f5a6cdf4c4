//! dbtune connection - Connection pooling and scoped connections
//!
//! This crate shares a bounded set of engine handles across concurrent
//! callers and offers a one-shot scoped connection for ad-hoc work.

mod manager;
pub mod pool;

pub use manager::ConnectionManager;
pub use pool::{
    ConnectionFactory, ConnectionPool, HandleId, PoolConfig, PoolStats, PooledConnection,
};

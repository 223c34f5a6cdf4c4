//! dbtune cache - Time-to-live caching of query results
//!
//! Results are keyed by a digest of the normalized query text and its bound
//! parameters. Expiry is discovered lazily on read; a full cache evicts the
//! entry with the oldest write before admitting a new key.

mod cache;
mod config;
mod key;
mod manager;
mod stats;

pub use cache::{CachedRows, QueryCache};
pub use config::CacheConfig;
pub use key::CacheKey;
pub use manager::{CacheManager, CacheStrategy};
pub use stats::CacheStats;

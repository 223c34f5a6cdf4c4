//! Cache key derivation

use std::fmt;

use dbtune_core::{Result, Value};
use ring::digest;
use serde::Serialize;

/// SHA-256 digest identifying a (query, params) pair
///
/// The query text is trimmed and lowercased before hashing; nothing else is
/// normalized, so queries that differ in whitespace or literal spelling get
/// different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

/// Fields serialize in declaration order, which keeps the digest stable.
#[derive(Serialize)]
struct KeyMaterial<'a> {
    query: String,
    params: &'a [Value],
}

impl CacheKey {
    /// Derive the key for a query and its ordered parameters
    pub fn derive(query: &str, params: &[Value]) -> Result<Self> {
        let material = KeyMaterial {
            query: query.trim().to_lowercase(),
            params,
        };
        let encoded = serde_json::to_vec(&material)?;

        let hash = digest::digest(&digest::SHA256, &encoded);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hash.as_ref());
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

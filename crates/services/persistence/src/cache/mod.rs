//! Cache adapter.
//!
//! A key → bytes store with expiry. Values are opaque: the repository encodes
//! entities through [`domain::Entity::encode`] before handing them over.

mod memory;
mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use domain::DocumentId;

use crate::store::Filter;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Cache key policy.
///
/// Primary entries live at `<collection>:<id>`; secondary entries for
/// predicate lookups live at `<collection>:q:<filter hash>`.
pub struct CacheKeys;

impl CacheKeys {
    pub fn entity(collection: &str, id: &DocumentId) -> String {
        format!("{}:{}", collection, id)
    }

    pub fn query(collection: &str, filter: &Filter) -> String {
        format!("{}:q:{}", collection, filter.canonical_hash())
    }
}

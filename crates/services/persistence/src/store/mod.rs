//! Document store adapter.
//!
//! Collections of JSON documents keyed by `_id`. The repository only talks to
//! the [`DocumentStore`] trait; [`MemoryDocumentStore`] and
//! [`PostgresDocumentStore`] are the two backends.

mod database;
mod filter;
mod memory;
pub mod migrations;
mod postgres;
mod query;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use database::Database;
pub use filter::{compare_values, Condition, Filter};
pub use memory::MemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{FindQuery, Patch, Sort, SortDirection};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// A stored document: the entity's JSON object, including `_id`.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Errors reported by a document store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate document id: {0}")]
    Duplicate(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Malformed(err.to_string())
    }
}

/// Outcome of an update-one or update-many call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Rows satisfying the filter
    pub matched: u64,
    /// Rows whose content actually changed
    pub modified: u64,
}

/// Collection-oriented document store.
///
/// Implementations must treat `find_one_and_replace` atomically, keep the
/// stored `_id` and `createdAt` of the replaced row, move `updatedAt`
/// strictly past the stored value, and return the post-image.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document; its `_id` must not exist yet.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError>;

    /// First document matching the filter, in `_id` order.
    async fn find_one(&self, collection: &str, filter: &Filter)
        -> Result<Option<Document>, StoreError>;

    async fn find_many(&self, collection: &str, query: &FindQuery)
        -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Replace the first match and return the stored post-image.
    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> Result<Option<Document>, StoreError>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateResult, StoreError>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateResult, StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}

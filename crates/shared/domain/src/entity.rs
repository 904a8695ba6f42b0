//! The stored-document contract shared by every entity collection.
//!
//! Each persisted entity embeds a [`Metadata`] block (`_id`, `createdAt`,
//! `updatedAt`, optional `deletedAt`) and implements [`Entity`] to name its
//! collection, its webhook event prefix and its cache serialization.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Opaque document identifier.
///
/// Backed by a UUIDv7, so the textual form sorts in creation order. This is
/// what makes the id a usable pagination key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Generate a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Placeholder carried by entities that have not been inserted yet.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parse the stringified form produced by `Display`.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| DomainError::invalid_identifier(raw))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for DocumentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for DocumentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Anything a caller may hand the repository as an identifier.
pub trait IntoDocumentId {
    fn into_document_id(self) -> DomainResult<DocumentId>;
}

impl IntoDocumentId for DocumentId {
    fn into_document_id(self) -> DomainResult<DocumentId> {
        Ok(self)
    }
}

impl IntoDocumentId for &DocumentId {
    fn into_document_id(self) -> DomainResult<DocumentId> {
        Ok(*self)
    }
}

impl IntoDocumentId for &str {
    fn into_document_id(self) -> DomainResult<DocumentId> {
        DocumentId::parse(self)
    }
}

impl IntoDocumentId for String {
    fn into_document_id(self) -> DomainResult<DocumentId> {
        DocumentId::parse(&self)
    }
}

impl IntoDocumentId for &String {
    fn into_document_id(self) -> DomainResult<DocumentId> {
        DocumentId::parse(self)
    }
}

/// Bookkeeping fields present on every stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete timestamp (None = active, Some = tombstoned)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Metadata for an entity that has not been inserted yet.
    ///
    /// The repository assigns the real id and timestamps at insert time.
    pub fn pending() -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::nil(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Stamp a freshly inserted document.
    pub fn assign(&mut self, id: DocumentId, now: DateTime<Utc>) {
        self.id = id;
        self.created_at = now;
        self.updated_at = now;
        self.deleted_at = None;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::pending()
    }
}

/// A persisted entity type.
///
/// Domain fields are opaque to the persistence layer; they are serialized
/// verbatim next to the flattened [`Metadata`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Document collection, also used as the cache key prefix.
    const COLLECTION: &'static str;

    /// Prefix of webhook event names (`<entity>.<verb>`).
    const ENTITY_NAME: &'static str;

    fn metadata(&self) -> &Metadata;

    fn metadata_mut(&mut self) -> &mut Metadata;

    fn id(&self) -> DocumentId {
        self.metadata().id
    }

    fn is_deleted(&self) -> bool {
        self.metadata().is_deleted()
    }

    /// Cache encoding. Must round-trip through [`Entity::decode`].
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

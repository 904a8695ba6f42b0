//! In-process document store.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use domain::{FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT};

use super::{
    compare_values, Document, DocumentStore, Filter, FindQuery, Patch, SortDirection, StoreError,
    UpdateResult,
};

type Collection = BTreeMap<String, Document>;

/// Document store backed by per-collection ordered maps.
///
/// Rows are keyed by their `_id` string, so iteration order is `_id` order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows in a collection, tombstones included.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        single: bool,
    ) -> Result<UpdateResult, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(rows) = collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        let mut result = UpdateResult::default();
        for row in rows.values_mut().filter(|row| filter.matches(row)) {
            result.matched += 1;
            if patch.apply(row) {
                result.modified += 1;
            }
            if single {
                break;
            }
        }
        Ok(result)
    }
}

fn stamp(document: &Document, field: &str) -> Option<DateTime<Utc>> {
    document
        .get(field)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// `updatedAt` for a replaced row: the proposed stamp, but never at or before
/// the stored one.
fn next_update_stamp(stored: DateTime<Utc>, proposed: DateTime<Utc>) -> DateTime<Utc> {
    if proposed > stored {
        proposed
    } else {
        stored + chrono::Duration::microseconds(1)
    }
}

fn document_id(document: &Document) -> Result<String, StoreError> {
    document
        .get(FIELD_ID)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Malformed(format!("missing string {}", FIELD_ID)))
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let id = document_id(&document)?;
        let mut collections = self.collections.write().await;
        let rows = collections.entry(collection.to_string()).or_default();

        if rows.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        rows.insert(id, document);
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|rows| rows.values().find(|row| filter.matches(row)))
            .cloned())
    }

    async fn find_many(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(rows) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<&Document> =
            rows.values().filter(|row| query.filter.matches(row)).collect();

        if let Some(sort) = &query.sort {
            matches.sort_by(|a, b| {
                let ordering = match (a.get(&sort.field), b.get(&sort.field)) {
                    (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(matches.into_iter().skip(skip).take(limit).cloned().collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map_or(0, |rows| rows.values().filter(|row| filter.matches(row)).count()) as u64)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: &Filter,
        mut document: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(rows) = collections.get_mut(collection) else {
            return Ok(None);
        };
        let Some(stored) = rows.values_mut().find(|row| filter.matches(row)) else {
            return Ok(None);
        };

        for field in [FIELD_ID, FIELD_CREATED_AT] {
            match stored.get(field) {
                Some(value) => document.insert(field.to_string(), value.clone()),
                None => document.remove(field),
            };
        }
        if let Some(previous) = stamp(stored, FIELD_UPDATED_AT) {
            let proposed = stamp(&document, FIELD_UPDATED_AT).unwrap_or(previous);
            let next = serde_json::to_value(next_update_stamp(previous, proposed))?;
            document.insert(FIELD_UPDATED_AT.to_string(), next);
        }
        *stored = document;
        Ok(Some(stored.clone()))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateResult, StoreError> {
        self.update(collection, filter, patch, true).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateResult, StoreError> {
        self.update(collection, filter, patch, false).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Sort;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    async fn seeded() -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (id, name) in [("a", "Alpha"), ("b", "Beta"), ("c", "Gamma")] {
            store
                .insert_one("things", doc(json!({ "_id": id, "name": name, "createdAt": "t0" })))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_and_missing_ids() {
        let store = seeded().await;

        let err = store
            .insert_one("things", doc(json!({ "_id": "a" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(id) if id == "a"));

        let err = store
            .insert_one("things", doc(json!({ "name": "anonymous" })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_find_many_sorts_skips_and_limits() {
        let store = seeded().await;

        let query = FindQuery::new(Filter::new())
            .sort(Sort::descending("_id"))
            .skip(1)
            .limit(5);
        let rows = store.find_many("things", &query).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let none = store
            .find_many("things", &FindQuery::new(Filter::new()).limit(0))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_identity_fields() {
        let store = seeded().await;

        let post = store
            .find_one_and_replace(
                "things",
                &Filter::new().eq("_id", "b"),
                doc(json!({ "_id": "zzz", "name": "Beta 2", "createdAt": "t9" })),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(post["_id"], "b");
        assert_eq!(post["createdAt"], "t0");
        assert_eq!(post["name"], "Beta 2");
        assert_eq!(store.len("things").await, 3);
    }

    #[tokio::test]
    async fn test_replace_moves_updated_at_past_the_stored_stamp() {
        let store = MemoryDocumentStore::new();
        let stored = Utc::now();
        store
            .insert_one("things", doc(json!({ "_id": "a", "updatedAt": stored })))
            .await
            .unwrap();

        let stale = stored - chrono::Duration::seconds(30);
        let post = store
            .find_one_and_replace("things", &Filter::new(), doc(json!({ "updatedAt": stale })))
            .await
            .unwrap()
            .unwrap();
        let updated = stamp(&post, FIELD_UPDATED_AT).unwrap();
        assert!(updated > stored);

        let later = updated + chrono::Duration::seconds(1);
        let post = store
            .find_one_and_replace("things", &Filter::new(), doc(json!({ "updatedAt": later })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stamp(&post, FIELD_UPDATED_AT), Some(later));
    }

    #[test]
    fn test_update_stamp_is_strictly_increasing() {
        let previous = Utc::now();
        assert!(next_update_stamp(previous, previous - chrono::Duration::seconds(5)) > previous);
        assert!(next_update_stamp(previous, previous) > previous);

        let later = previous + chrono::Duration::seconds(1);
        assert_eq!(next_update_stamp(previous, later), later);
    }

    #[tokio::test]
    async fn test_update_counts_matched_and_modified() {
        let store = seeded().await;
        let patch = Patch::new().set("name", "Alpha");

        let result = store.update_many("things", &Filter::new(), &patch).await.unwrap();
        assert_eq!(result, UpdateResult { matched: 3, modified: 2 });

        let result = store
            .update_one("things", &Filter::new().eq("_id", "missing"), &patch)
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::default());
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty() {
        let store = MemoryDocumentStore::new();
        assert_eq!(store.count("nothing", &Filter::new()).await.unwrap(), 0);
        assert!(store.find_one("nothing", &Filter::new()).await.unwrap().is_none());
    }
}

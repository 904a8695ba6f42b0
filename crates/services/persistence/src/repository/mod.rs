//! Generic cache-through repository.
//!
//! Reads consult the cache first and fall back to the document store,
//! repopulating the cache on success. Writes mutate the store, then delete
//! (never overwrite) the cached entry, then publish `<entity>.<verb>`.
//!
//! Cache faults are logged and bypassed. Store faults always surface, as
//! `StoreReadFailed` or `StoreWriteFailed`. Every store call runs under the
//! point or list deadline and the handle's cancellation token.

mod context;
pub mod users;

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use common::{AppError, AppResult, OptionExt};
use domain::{DocumentId, Entity, IntoDocumentId, FIELD_DELETED_AT, FIELD_ID};

use crate::cache::CacheKeys;
use crate::pagination::{Page, PageArgs, PageWindow};
use crate::store::{Document, FindQuery, Filter, Patch, Sort, StoreError, UpdateResult};
use crate::webhook::EventVerb;

pub use context::RepositoryContext;
pub use users::{UserRepository, UserStore};

#[cfg(any(test, feature = "test-utils"))]
pub use users::MockUserRepository;

/// In-flight row tombstones of one bulk soft delete.
const BULK_DELETE_CONCURRENCY: usize = 8;

/// Repository for one entity type, bound to its collection.
pub struct Repository<E: Entity> {
    ctx: RepositoryContext,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(ctx: RepositoryContext) -> Self {
        Self {
            ctx,
            _entity: PhantomData,
        }
    }

    /// Handle bound to a child of this handle's token, for one request.
    ///
    /// Cancelling the child aborts only calls made through the returned
    /// handle; cancelling the parent aborts both.
    pub fn scoped(&self) -> Self {
        self.with_cancellation(self.ctx.cancel.child_token())
    }

    /// Handle whose calls abort when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        let mut ctx = self.ctx.clone();
        ctx.cancel = token;
        Self::new(ctx)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.ctx.cancel
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Assign a fresh id and timestamps, store the entity and return the
    /// post-image.
    pub async fn insert(&self, mut entity: E) -> AppResult<E> {
        entity.metadata_mut().assign(DocumentId::new(), Utc::now());
        let document = to_document(&entity)?;

        self.write(
            "insert",
            self.point_deadline(),
            self.ctx.store.insert_one(E::COLLECTION, document),
        )
        .await?;

        let id = entity.id();
        self.cache_put(&CacheKeys::entity(E::COLLECTION, &id), &entity).await;
        self.publish_entity(EventVerb::Created, &entity);

        tracing::debug!(collection = E::COLLECTION, id = %id, "Document inserted");
        Ok(entity)
    }

    /// Atomically replace a live document and return the stored post-image.
    ///
    /// `updatedAt` is refreshed to now; the store keeps it strictly later than
    /// the stored value. Tombstoned or unknown ids yield `NotFound`.
    pub async fn replace(&self, mut entity: E) -> AppResult<E> {
        let id = entity.id();
        if id.is_nil() {
            return Err(AppError::invalid_argument(
                "cannot replace an entity that was never inserted",
            ));
        }

        let meta = entity.metadata_mut();
        meta.updated_at = Utc::now();
        meta.deleted_at = None;
        let document = to_document(&entity)?;

        let outcome = self
            .write(
                "replace",
                self.point_deadline(),
                self.ctx
                    .store
                    .find_one_and_replace(E::COLLECTION, &Filter::by_id(&id).live(), document),
            )
            .await;

        // A failed or abandoned write may still have committed
        self.cache_delete(&CacheKeys::entity(E::COLLECTION, &id)).await;

        let post: E = from_document(outcome?.ok_or_not_found()?)?;
        self.publish_entity(EventVerb::Updated, &post);

        tracing::debug!(collection = E::COLLECTION, id = %id, "Document replaced");
        Ok(post)
    }

    /// Tombstone a live document.
    ///
    /// Returns `true` only if a row was matched and modified; an unknown or
    /// already-deleted id returns `false`.
    pub async fn soft_delete(&self, id: impl IntoDocumentId) -> AppResult<bool> {
        let id = id.into_document_id()?;
        let deleted = self.tombstone(&id, Filter::by_id(&id), Utc::now()).await?;
        if deleted {
            tracing::debug!(collection = E::COLLECTION, id = %id, "Document soft-deleted");
        }
        Ok(deleted)
    }

    /// Tombstone every live document matching the filter.
    ///
    /// The matching ids are read first; each row is then tombstoned on its
    /// own (still subject to the filter), invalidated and announced. Rows that
    /// start matching after the read are left alone. On a partial failure the
    /// first error is returned, and rows already tombstoned stay invalidated
    /// and announced.
    pub async fn soft_delete_where(&self, filter: Filter) -> AppResult<u64> {
        let query = FindQuery::new(filter.clone().live()).sort(Sort::ascending(FIELD_ID));
        let candidates = self
            .read(
                "find_soft_delete_candidates",
                self.list_deadline(),
                self.ctx.store.find_many(E::COLLECTION, &query),
            )
            .await?;
        let ids: Vec<DocumentId> = candidates.iter().filter_map(document_id).collect();

        let stamp = Utc::now();
        let outcomes: Vec<AppResult<bool>> = stream::iter(&ids)
            .map(|id| self.tombstone(id, filter.clone().and(Filter::by_id(id)), stamp))
            .buffer_unordered(BULK_DELETE_CONCURRENCY)
            .collect()
            .await;

        let mut deleted = 0;
        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        tracing::debug!(
            collection = E::COLLECTION,
            candidates = ids.len(),
            count = deleted,
            "Documents soft-deleted"
        );
        match failure {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// Stamp `deletedAt` on the live row `id` if it still satisfies `scope`.
    ///
    /// The cache key is invalidated whatever the write's outcome.
    async fn tombstone(
        &self,
        id: &DocumentId,
        scope: Filter,
        stamp: DateTime<Utc>,
    ) -> AppResult<bool> {
        let patch = Patch::new().set(FIELD_DELETED_AT, serde_json::to_value(stamp)?);

        let outcome = self
            .write(
                "soft_delete",
                self.point_deadline(),
                self.ctx
                    .store
                    .update_one(E::COLLECTION, &scope.live(), &patch),
            )
            .await;

        self.cache_delete(&CacheKeys::entity(E::COLLECTION, id)).await;

        let result = outcome?;
        let deleted = result.matched > 0 && result.modified > 0;
        if deleted {
            self.publish(EventVerb::Deleted, deletion_descriptor(id, stamp, result));
        }
        Ok(deleted)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Live document by id.
    pub async fn get_by_id(&self, id: impl IntoDocumentId) -> AppResult<E> {
        self.lookup_by_id(id.into_document_id()?, false).await
    }

    /// Document by id, tombstoned rows included.
    pub async fn get_by_id_with_deleted(&self, id: impl IntoDocumentId) -> AppResult<E> {
        self.lookup_by_id(id.into_document_id()?, true).await
    }

    async fn lookup_by_id(&self, id: DocumentId, include_deleted: bool) -> AppResult<E> {
        let key = CacheKeys::entity(E::COLLECTION, &id);

        if let Some(hit) = self.cache_get(&key).await {
            if include_deleted || !hit.is_deleted() {
                return Ok(hit);
            }
        }

        let mut filter = Filter::by_id(&id);
        if !include_deleted {
            filter = filter.live();
        }

        let found = self
            .read(
                "find_by_id",
                self.point_deadline(),
                self.ctx.store.find_one(E::COLLECTION, &filter),
            )
            .await?;
        let entity: E = from_document(found.ok_or_not_found()?)?;

        self.cache_put(&key, &entity).await;
        Ok(entity)
    }

    /// First live document matching the predicate.
    ///
    /// Cached under the predicate's canonical hash; the by-id entry is
    /// populated as well.
    pub async fn find_one(&self, filter: Filter) -> AppResult<E> {
        let filter = filter.live();
        let key = CacheKeys::query(E::COLLECTION, &filter);

        if let Some(hit) = self.cache_get(&key).await {
            if !hit.is_deleted() {
                return Ok(hit);
            }
        }

        let found = self
            .read(
                "find_one",
                self.point_deadline(),
                self.ctx.store.find_one(E::COLLECTION, &filter),
            )
            .await?;
        let entity: E = from_document(found.ok_or_not_found()?)?;

        self.cache_put(&key, &entity).await;
        self.cache_put(&CacheKeys::entity(E::COLLECTION, &entity.id()), &entity).await;
        Ok(entity)
    }

    /// Drop the cached result of a predicate lookup.
    ///
    /// Predicate entries are otherwise left to expire; callers that know
    /// which lookups a write affects can clear them eagerly.
    pub async fn invalidate_lookup(&self, filter: Filter) {
        self.cache_delete(&CacheKeys::query(E::COLLECTION, &filter.live())).await;
    }

    /// Live documents matching the filter.
    pub async fn count(&self, filter: Filter) -> AppResult<u64> {
        self.read(
            "count",
            self.list_deadline(),
            self.ctx.store.count(E::COLLECTION, &filter.live()),
        )
        .await
    }

    /// One page of live documents in `_id` order.
    pub async fn list(&self, filter: Filter, args: &PageArgs) -> AppResult<Page<E>> {
        let window = PageWindow::from_args(args)?;
        let filter = window.apply(filter.live());

        let total_count = self
            .read(
                "count",
                self.list_deadline(),
                self.ctx.store.count(E::COLLECTION, &filter),
            )
            .await?;
        let plan = window.plan(total_count);

        let documents = if plan.limit == Some(0) {
            Vec::new()
        } else {
            let mut query = FindQuery::new(filter)
                .sort(Sort {
                    field: FIELD_ID.to_string(),
                    direction: plan.direction,
                })
                .skip(plan.skip);
            if let Some(limit) = plan.limit {
                query = query.limit(limit);
            }
            self.read(
                "find_many",
                self.list_deadline(),
                self.ctx.store.find_many(E::COLLECTION, &query),
            )
            .await?
        };

        let mut items = documents
            .into_iter()
            .map(from_document)
            .collect::<AppResult<Vec<E>>>()?;
        if plan.reversed() {
            items.reverse();
        }

        Ok(Page::new(items, total_count, &plan))
    }

    // =========================================================================
    // Deadlines and cancellation
    // =========================================================================

    fn point_deadline(&self) -> Duration {
        self.ctx.config.point_op_timeout()
    }

    fn list_deadline(&self) -> Duration {
        self.ctx.config.list_op_timeout()
    }

    /// Run a store call under a deadline and the cancellation token.
    async fn guarded<T>(
        &self,
        op: &'static str,
        deadline: Duration,
        call: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => {
                tracing::debug!(collection = E::COLLECTION, op, "Store call cancelled");
                Err(AppError::Cancelled)
            }
            outcome = tokio::time::timeout(deadline, call) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(
                        collection = E::COLLECTION,
                        op,
                        ?deadline,
                        "Store call timed out"
                    );
                    Err(AppError::Timeout(op))
                }
            },
        }
    }

    async fn read<T>(
        &self,
        op: &'static str,
        deadline: Duration,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> AppResult<T> {
        self.guarded(op, deadline, async move {
            call.await.map_err(|e| {
                tracing::error!(collection = E::COLLECTION, op, error = %e, "Store read failed");
                AppError::store_read(e)
            })
        })
        .await
    }

    async fn write<T>(
        &self,
        op: &'static str,
        deadline: Duration,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> AppResult<T> {
        self.guarded(op, deadline, async move {
            call.await.map_err(|e| {
                tracing::error!(collection = E::COLLECTION, op, error = %e, "Store write failed");
                AppError::store_write(e)
            })
        })
        .await
    }

    // =========================================================================
    // Cache (best effort)
    // =========================================================================

    /// Cached entity, or `None` on miss, fault, timeout or undecodable bytes.
    async fn cache_get(&self, key: &str) -> Option<E> {
        let op_timeout = self.ctx.config.cache.op_timeout();
        let lookup = tokio::time::timeout(op_timeout, self.ctx.cache.get(key));
        let outcome = tokio::select! {
            biased;
            _ = self.ctx.cancel.cancelled() => return None,
            outcome = lookup => outcome,
        };

        match outcome {
            Ok(Ok(Some(bytes))) => match E::decode(&bytes) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "Cache read failed");
                None
            }
            Err(_) => {
                tracing::warn!(key, "Cache read timed out");
                None
            }
        }
    }

    /// Populate an entry. Tombstoned rows are never cached.
    async fn cache_put(&self, key: &str, entity: &E) {
        if entity.is_deleted() || self.ctx.cancel.is_cancelled() {
            return;
        }

        let bytes = match entity.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache encoding failed");
                return;
            }
        };

        let ttl = self.ctx.config.cache.default_ttl();
        let op_timeout = self.ctx.config.cache.op_timeout();
        match tokio::time::timeout(op_timeout, self.ctx.cache.set(key, bytes, ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(key, error = %e, "Cache write failed"),
            Err(_) => tracing::warn!(key, "Cache write timed out"),
        }
    }

    /// Invalidate an entry. Runs even on a cancelled handle, since it follows
    /// a committed write.
    async fn cache_delete(&self, key: &str) {
        let op_timeout = self.ctx.config.cache.op_timeout();
        match tokio::time::timeout(op_timeout, self.ctx.cache.delete(key)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(key, error = %e, "Cache invalidation failed"),
            Err(_) => tracing::warn!(key, "Cache invalidation timed out"),
        }
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    fn publish(&self, verb: EventVerb, payload: Value) {
        self.ctx
            .webhooks
            .publish(verb.event_name(E::ENTITY_NAME), payload);
    }

    fn publish_entity(&self, verb: EventVerb, entity: &E) {
        match serde_json::to_value(entity) {
            Ok(payload) => self.publish(verb, payload),
            Err(e) => tracing::warn!(
                collection = E::COLLECTION,
                error = %e,
                "Skipping webhook for unserializable entity"
            ),
        }
    }
}

fn deletion_descriptor(id: &DocumentId, stamp: DateTime<Utc>, result: UpdateResult) -> Value {
    json!({
        "_id": id,
        "deletedAt": stamp,
        "matchedCount": result.matched,
        "modifiedCount": result.modified,
    })
}

fn to_document<E: Entity>(entity: &E) -> AppResult<Document> {
    match serde_json::to_value(entity)? {
        Value::Object(document) => Ok(document),
        _ => Err(AppError::Serialization(format!(
            "{} does not serialize to an object",
            E::ENTITY_NAME
        ))),
    }
}

fn from_document<E: Entity>(document: Document) -> AppResult<E> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

fn document_id(document: &Document) -> Option<DocumentId> {
    document
        .get(FIELD_ID)
        .and_then(Value::as_str)
        .and_then(|raw| DocumentId::parse(raw).ok())
}

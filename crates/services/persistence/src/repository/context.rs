//! Process-wide backends shared by every entity repository.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::{AppError, AppResult, StoreConfig};
use domain::Entity;

use crate::cache::{CacheStore, RedisCache};
use crate::store::{Database, DocumentStore, PostgresDocumentStore};
use crate::webhook::{WebhookPublisher, WebhookTransport};

use super::Repository;

/// Store, cache, webhook publisher and configuration, bundled so that each
/// entity's [`Repository`] shares one set of connections.
#[derive(Clone)]
pub struct RepositoryContext {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) webhooks: WebhookPublisher,
    pub(crate) config: Arc<StoreConfig>,
    pub(crate) cancel: CancellationToken,
}

impl RepositoryContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn CacheStore>,
        webhooks: WebhookPublisher,
        config: StoreConfig,
    ) -> Self {
        Self {
            store,
            cache,
            webhooks,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Connect to Postgres (bootstrapping the schema) and Redis, and start
    /// the webhook publisher.
    pub async fn connect(
        config: StoreConfig,
        transport: Arc<dyn WebhookTransport>,
    ) -> AppResult<Self> {
        let db = Database::connect(&config.database)
            .await
            .map_err(|e| AppError::internal(format!("Database connection failed: {}", e)))?;
        let cache = RedisCache::connect(&config.cache)
            .await
            .map_err(|e| AppError::internal(format!("Cache connection failed: {}", e)))?;
        let webhooks = WebhookPublisher::spawn(transport, &config.webhook);

        Ok(Self::new(
            Arc::new(PostgresDocumentStore::new(db.get_connection())),
            Arc::new(cache),
            webhooks,
            config,
        ))
    }

    /// Repository for one entity type over these backends.
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.clone())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Root token; cancelling it aborts in-flight calls of every repository.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Connectivity check of both backends.
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await.map_err(AppError::store_read)?;
        self.cache
            .ping()
            .await
            .map_err(|e| AppError::Cache(e.to_string()))?;
        Ok(())
    }
}

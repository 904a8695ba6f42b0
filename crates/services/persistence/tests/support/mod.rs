//! Shared fixtures: in-memory backends wired into a repository context.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use common::StoreConfig;
use domain::{Entity, User};
use persistence_lib::{
    MemoryCache, MemoryDocumentStore, RecordingTransport, Repository, RepositoryContext,
    WebhookPublisher,
};

/// Long enough for the webhook pool to drain on a loaded CI runner.
pub const DELIVERY_WAIT: Duration = Duration::from_secs(2);

pub struct Harness {
    pub ctx: RepositoryContext,
    pub store: Arc<MemoryDocumentStore>,
    pub cache: Arc<MemoryCache>,
    pub webhooks: Arc<RecordingTransport>,
}

impl Harness {
    pub fn new() -> Self {
        let config = StoreConfig::default();
        let store = Arc::new(MemoryDocumentStore::new());
        let cache = Arc::new(MemoryCache::new());
        let webhooks = Arc::new(RecordingTransport::new());
        let publisher = WebhookPublisher::spawn(webhooks.clone(), &config.webhook);

        let ctx = RepositoryContext::new(store.clone(), cache.clone(), publisher, config);
        Self {
            ctx,
            store,
            cache,
            webhooks,
        }
    }

    pub fn repository<E: Entity>(&self) -> Repository<E> {
        self.ctx.repository()
    }

    pub fn users(&self) -> Repository<User> {
        self.repository()
    }

    /// Names of every event delivered once `count` have arrived.
    pub async fn event_names(&self, count: usize) -> Vec<String> {
        self.webhooks
            .wait_for(count, DELIVERY_WAIT)
            .await
            .into_iter()
            .map(|e| e.name)
            .collect()
    }
}

pub fn user(name: &str) -> User {
    User::new(format!("{}@example.com", name.to_lowercase()), name.to_string())
}

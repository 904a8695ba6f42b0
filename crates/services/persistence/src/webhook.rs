//! Webhook side-effect channel.
//!
//! [`WebhookPublisher::publish`] hands an event to a bounded queue and returns
//! immediately. A dispatcher task drains the queue and runs each delivery on
//! its own task, with at most `worker_count` deliveries in flight. Delivery is
//! best-effort: a full queue or a failing transport drops the event with a
//! warning, and no ordering between events is preserved.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Notify, Semaphore};

use common::WebhookConfig;
use domain::{VERB_CREATED, VERB_DELETED, VERB_UPDATED};

/// Mutation verbs announced on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventVerb {
    Created,
    Updated,
    Deleted,
}

impl EventVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventVerb::Created => VERB_CREATED,
            EventVerb::Updated => VERB_UPDATED,
            EventVerb::Deleted => VERB_DELETED,
        }
    }

    /// `<entity>.<verb>`
    pub fn event_name(&self, entity: &str) -> String {
        format!("{}.{}", entity, self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub name: String,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Final hop of an event; HTTP or queue integrations implement this.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, event: &WebhookEvent) -> Result<(), WebhookError>;
}

/// Transport that only logs each event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTransport;

#[async_trait]
impl WebhookTransport for TracingTransport {
    async fn deliver(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        tracing::info!(event = %event.name, "Webhook event published");
        Ok(())
    }
}

/// Transport that keeps every delivered event in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<WebhookEvent>>,
    delivered: Notify,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WebhookEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    /// Wait until at least `count` events arrived or `timeout` elapsed, then
    /// return everything recorded so far.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<WebhookEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.delivered.notified();
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.events();
            }
        }
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn deliver(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        self.events
            .lock()
            .map_err(|_| WebhookError::Delivery("recorder poisoned".to_string()))?
            .push(event.clone());
        self.delivered.notify_waiters();
        Ok(())
    }
}

/// Non-blocking handle onto the delivery pool. Cheap to clone.
#[derive(Clone)]
pub struct WebhookPublisher {
    sender: mpsc::Sender<WebhookEvent>,
}

impl WebhookPublisher {
    /// Start the dispatcher on the current Tokio runtime.
    ///
    /// The dispatcher exits once every publisher clone has been dropped.
    pub fn spawn(transport: Arc<dyn WebhookTransport>, config: &WebhookConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.worker_count.max(1)));

        tokio::spawn(dispatch(receiver, transport, permits));

        tracing::debug!(
            workers = config.worker_count,
            capacity = config.queue_capacity,
            "Webhook publisher started"
        );

        Self { sender }
    }

    /// Enqueue an event. Never blocks and never fails.
    pub fn publish(&self, name: impl Into<String>, payload: Value) {
        let event = WebhookEvent {
            name: name.into(),
            payload,
            occurred_at: Utc::now(),
        };

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(event = %event.name, "Webhook queue full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(event = %event.name, "Webhook dispatcher stopped, dropping event");
            }
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<WebhookEvent>,
    transport: Arc<dyn WebhookTransport>,
    permits: Arc<Semaphore>,
) {
    while let Some(event) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let transport = transport.clone();

        tokio::spawn(async move {
            if let Err(e) = transport.deliver(&event).await {
                tracing::warn!(event = %event.name, error = %e, "Webhook delivery failed");
            }
            drop(permit);
        });
    }

    tracing::debug!("Webhook dispatcher stopped");
}

//! Post-execute notifications
//!
//! After a write action commits, the API publishes an [`ApiEvent`] on the
//! [`EventBus`]. It uses `tokio::sync::broadcast` so any number of listeners
//! (audit logs, cache invalidation) can observe mutations without being part
//! of the action itself.
//!
//! ```text
//! ActionBuilder::execute() ──▶ commit ──▶ EventBus::publish() ──▶ subscribers
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Mutation notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ApiEvent {
    /// A record was created
    Created {
        entity: String,
        id: i64,
        values: serde_json::Value,
    },
    /// Records were updated
    Updated {
        entity: String,
        ids: Vec<i64>,
        values: serde_json::Value,
    },
}

impl ApiEvent {
    /// Get the entity type this event relates to
    pub fn entity(&self) -> &str {
        match self {
            ApiEvent::Created { entity, .. } | ApiEvent::Updated { entity, .. } => entity,
        }
    }

    /// Get the action name (created, updated)
    pub fn action(&self) -> &str {
        match self {
            ApiEvent::Created { .. } => "created",
            ApiEvent::Updated { .. } => "updated",
        }
    }

    /// Ids of the records touched
    pub fn ids(&self) -> Vec<i64> {
        match self {
            ApiEvent::Created { id, .. } => vec![*id],
            ApiEvent::Updated { ids, .. } => ids.clone(),
        }
    }
}

/// Envelope wrapping an event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: ApiEvent,
}

impl EventEnvelope {
    /// Create a new event envelope
    pub fn new(event: ApiEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// The bus is cheap to clone and can be shared across threads.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start losing events (lagged).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails. Without subscribers the event is dropped.
    /// Returns the number of receivers that will receive the event.
    pub fn publish(&self, event: ApiEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Get the current number of active subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

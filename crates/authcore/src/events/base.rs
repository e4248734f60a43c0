use crate::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type EventId = Uuid;

/// A domain event produced by a commit-phase effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// e.g. `user.created`, `notification.welcome_message`
    pub kind: String,
    pub payload: serde_json::Value,
    /// Whether the event belongs in the audit log. Tenants may override this
    /// per kind.
    pub audit: bool,
}

impl DomainEvent {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            audit: false,
        }
    }

    pub fn audited(mut self) -> Self {
        self.audit = true;
        self
    }
}

/// A dispatched event with its delivery context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: EventId,
    pub flow_id: Uuid,
    pub tenant_id: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}

impl EventEnvelope {
    pub fn new(
        flow_id: Uuid,
        tenant_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        event: DomainEvent,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_id,
            tenant_id: tenant_id.into(),
            occurred_at,
            event,
        }
    }
}

/// Where commit-phase events go once the transaction has committed.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, envelope: EventEnvelope) -> Result<(), ServiceError>;
}

/// In-process broadcast sink.
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn emit(&self, envelope: EventEnvelope) {
        let _ = self.sender.send(envelope);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn dispatch(&self, envelope: EventEnvelope) -> Result<(), ServiceError> {
        tracing::debug!(kind = %envelope.event.kind, flow_id = %envelope.flow_id, "dispatching event");
        self.emit(envelope);
        Ok(())
    }
}

mod base;

pub use base::{DomainEvent, EventBus, EventEnvelope, EventId, EventSink};

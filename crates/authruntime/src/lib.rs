//! Flow execution runtime
//!
//! This crate reconstructs flows from their persisted journal, advances them
//! one input at a time, runs step effects inside a transaction and persists
//! the extended journal with an optimistic version check.

pub mod codec;
mod effects;
mod engine;
pub mod memory;
mod registry;
mod service;
pub mod store;

pub use codec::{journal, replay, KindRecord, NodeEntry, NodeRecord};
pub use effects::dispatch;
pub use engine::{Engine, OutputEntry, Transition};
pub use registry::{IntentFactory, NodeFactory, Registry, SerdeFactory};
pub use service::{FlowOutput, FlowService, RuntimeConfig};
pub use store::{FlowInstance, FlowStore, InMemoryFlowStore, StoreError};

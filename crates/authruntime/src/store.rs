use crate::codec::{KindRecord, NodeRecord};
use async_trait::async_trait;
use authcore::FlowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A persisted flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstance {
    pub id: Uuid,
    pub tenant_id: String,
    pub root: KindRecord,
    /// Append-only, in append order.
    pub nodes: Vec<NodeRecord>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FlowInstance {
    /// Number of appended nodes; the expected version for the next append.
    pub fn version(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("flow {0} not found")]
    NotFound(Uuid),

    #[error("flow {flow_id} is at version {actual}, expected {expected}")]
    Conflict {
        flow_id: Uuid,
        expected: usize,
        actual: usize,
    },

    #[error("flow {0} already exists")]
    AlreadyExists(Uuid),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for FlowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => FlowError::NotFound(id),
            StoreError::Conflict {
                flow_id,
                expected,
                actual,
            } => FlowError::Conflict {
                flow_id,
                expected,
                actual,
            },
            other => FlowError::Store(other.to_string()),
        }
    }
}

/// Persistence for flow instances. Appends are optimistic: they only succeed
/// when the stored node count still equals `expected_version`.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn create(&self, instance: FlowInstance) -> Result<(), StoreError>;

    async fn load(&self, flow_id: Uuid) -> Result<FlowInstance, StoreError>;

    /// Returns the new version.
    async fn append(
        &self,
        flow_id: Uuid,
        records: Vec<NodeRecord>,
        expected_version: usize,
    ) -> Result<usize, StoreError>;

    /// Undoes an append whose transaction failed to commit: drops every
    /// record past `version`, provided the flow is still at
    /// `expected_version`.
    async fn truncate(
        &self,
        flow_id: Uuid,
        version: usize,
        expected_version: usize,
    ) -> Result<(), StoreError>;

    async fn delete(&self, flow_id: Uuid) -> Result<(), StoreError>;

    /// Removes every instance expired at `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: RwLock<HashMap<Uuid, FlowInstance>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.flows.read().await.is_empty()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn create(&self, instance: FlowInstance) -> Result<(), StoreError> {
        let mut flows = self.flows.write().await;
        if flows.contains_key(&instance.id) {
            return Err(StoreError::AlreadyExists(instance.id));
        }
        flows.insert(instance.id, instance);
        Ok(())
    }

    async fn load(&self, flow_id: Uuid) -> Result<FlowInstance, StoreError> {
        self.flows
            .read()
            .await
            .get(&flow_id)
            .cloned()
            .ok_or(StoreError::NotFound(flow_id))
    }

    async fn append(
        &self,
        flow_id: Uuid,
        records: Vec<NodeRecord>,
        expected_version: usize,
    ) -> Result<usize, StoreError> {
        let mut flows = self.flows.write().await;
        let instance = flows.get_mut(&flow_id).ok_or(StoreError::NotFound(flow_id))?;
        if instance.nodes.len() != expected_version {
            return Err(StoreError::Conflict {
                flow_id,
                expected: expected_version,
                actual: instance.nodes.len(),
            });
        }
        instance.nodes.extend(records);
        Ok(instance.nodes.len())
    }

    async fn truncate(
        &self,
        flow_id: Uuid,
        version: usize,
        expected_version: usize,
    ) -> Result<(), StoreError> {
        let mut flows = self.flows.write().await;
        let instance = flows.get_mut(&flow_id).ok_or(StoreError::NotFound(flow_id))?;
        if instance.nodes.len() != expected_version {
            return Err(StoreError::Conflict {
                flow_id,
                expected: expected_version,
                actual: instance.nodes.len(),
            });
        }
        instance.nodes.truncate(version);
        Ok(())
    }

    async fn delete(&self, flow_id: Uuid) -> Result<(), StoreError> {
        self.flows
            .write()
            .await
            .remove(&flow_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(flow_id))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut flows = self.flows.write().await;
        let before = flows.len();
        flows.retain(|_, instance| !instance.is_expired(now));
        Ok(before - flows.len())
    }
}

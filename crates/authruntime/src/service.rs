use crate::codec::{encode_intent, journal, replay};
use crate::engine::{Engine, OutputEntry, Transition};
use crate::store::{FlowInstance, FlowStore, StoreError};
use crate::{effects, Registry};
use authcore::{Dependencies, FlowError, Graph, InputDescriptor, Intent, RawInput};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Lifetime of a flow unless the tenant overrides it.
    pub flow_ttl: Duration,
    /// Automatic steps allowed in one transition.
    pub max_auto_steps: usize,
    /// How often `accept` reloads and retries after losing an append race.
    pub conflict_retries: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flow_ttl: Duration::minutes(20),
            max_auto_steps: 16,
            conflict_retries: 0,
        }
    }
}

/// What the caller renders after each request.
#[derive(Debug, Clone, Serialize)]
pub struct FlowOutput {
    pub flow_id: Uuid,
    pub tenant_id: String,
    pub legal_next_inputs: Vec<InputDescriptor>,
    pub data: Vec<OutputEntry>,
    pub is_complete: bool,
    pub expires_at: DateTime<Utc>,
}

impl FlowOutput {
    /// Output data of the first step of the given kind.
    pub fn data_of(&self, kind: &str) -> Option<&serde_json::Value> {
        self.data.iter().find(|e| e.kind == kind).map(|e| &e.data)
    }

    pub fn accepts(&self, schema_name: &str) -> bool {
        self.legal_next_inputs.iter().any(|d| d.name == schema_name)
    }
}

/// Store write made inside the current transaction.
#[derive(Debug, Clone, Copy)]
enum Written {
    Created,
    Appended { from: usize, to: usize },
}

/// Loads, advances and persists flows.
pub struct FlowService {
    registry: Arc<Registry>,
    store: Arc<dyn FlowStore>,
    config: RuntimeConfig,
}

impl FlowService {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn FlowStore>) -> Self {
        Self::with_config(registry, store, RuntimeConfig::default())
    }

    pub fn with_config(
        registry: Arc<Registry>,
        store: Arc<dyn FlowStore>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    fn ttl(&self, deps: &Dependencies) -> Duration {
        deps.config
            .flow_lifetime_seconds
            .and_then(|s| i64::try_from(s).ok())
            .map(Duration::seconds)
            .unwrap_or(self.config.flow_ttl)
    }

    /// Starts a flow headed by `intent` and runs its automatic steps.
    pub async fn create(
        &self,
        deps: &Dependencies,
        intent: Box<dyn Intent>,
    ) -> Result<FlowOutput, FlowError> {
        let flow_id = Uuid::new_v4();
        let now = deps.now();
        let mut graph = Graph::new(intent);
        let root = encode_intent(graph.intent())?;
        tracing::info!(flow_id = %flow_id, tenant_id = deps.tenant_id(), kind = %root.kind, "Creating flow");

        deps.database.begin().await?;
        let engine = Engine::new(deps, flow_id, self.config.max_auto_steps);
        let transition = match engine.start(&mut graph).await {
            Ok(t) => t,
            Err(e) => return Err(rollback(deps, flow_id, e).await),
        };

        let persisted = journal(&graph).map(|nodes| FlowInstance {
            id: flow_id,
            tenant_id: deps.tenant_id().to_string(),
            root,
            nodes,
            created_at: now,
            expires_at: now + self.ttl(deps),
        });
        let instance = match persisted {
            Ok(instance) => instance,
            Err(e) => return Err(rollback(deps, flow_id, e).await),
        };
        let expires_at = instance.expires_at;
        if let Err(e) = self.store.create(instance).await {
            return Err(rollback(deps, flow_id, e.into()).await);
        }

        self.commit(deps, flow_id, transition, Written::Created).await?;
        self.output(deps, flow_id, &graph, expires_at).await
    }

    /// Current view of a flow, without advancing it.
    pub async fn get(&self, deps: &Dependencies, flow_id: Uuid) -> Result<FlowOutput, FlowError> {
        let instance = self.load(deps, flow_id).await?;
        let graph = replay(&self.registry, &instance.root, &instance.nodes)?;
        self.output(deps, flow_id, &graph, instance.expires_at).await
    }

    /// Applies one input. Either the whole transition is persisted and
    /// committed, or nothing is.
    pub async fn accept(
        &self,
        deps: &Dependencies,
        flow_id: Uuid,
        raw: &RawInput,
    ) -> Result<FlowOutput, FlowError> {
        let mut attempt = 0;
        loop {
            match self.try_accept(deps, flow_id, raw).await {
                Err(FlowError::Conflict { .. }) if attempt < self.config.conflict_retries => {
                    attempt += 1;
                    tracing::warn!(flow_id = %flow_id, attempt, "Flow advanced concurrently, retrying");
                }
                result => return result,
            }
        }
    }

    async fn try_accept(
        &self,
        deps: &Dependencies,
        flow_id: Uuid,
        raw: &RawInput,
    ) -> Result<FlowOutput, FlowError> {
        let instance = self.load(deps, flow_id).await?;
        let version = instance.version();
        let mut graph = replay(&self.registry, &instance.root, &instance.nodes)?;

        deps.database.begin().await?;
        let engine = Engine::new(deps, flow_id, self.config.max_auto_steps);
        let transition = match engine.accept(&mut graph, raw).await {
            Ok(t) => t,
            Err(e) => return Err(rollback(deps, flow_id, e).await),
        };

        let records = match journal(&graph) {
            Ok(records) => records.into_iter().skip(version).collect::<Vec<_>>(),
            Err(e) => return Err(rollback(deps, flow_id, e).await),
        };
        let written = match self.store.append(flow_id, records, version).await {
            Ok(new_version) => {
                tracing::debug!(flow_id = %flow_id, version = new_version, "Flow persisted");
                Written::Appended {
                    from: version,
                    to: new_version,
                }
            }
            Err(e) => {
                if let StoreError::Conflict { actual, .. } = &e {
                    tracing::warn!(flow_id = %flow_id, expected = version, actual, "Append conflict");
                }
                return Err(rollback(deps, flow_id, e.into()).await);
            }
        };

        self.commit(deps, flow_id, transition, written).await?;
        self.output(deps, flow_id, &graph, instance.expires_at).await
    }

    /// Discards a flow.
    pub async fn cancel(&self, deps: &Dependencies, flow_id: Uuid) -> Result<(), FlowError> {
        self.load(deps, flow_id).await?;
        self.store.delete(flow_id).await?;
        tracing::info!(flow_id = %flow_id, "Flow cancelled");
        Ok(())
    }

    /// Drops every flow that has expired. Returns how many were removed.
    pub async fn purge_expired(&self, deps: &Dependencies) -> Result<usize, FlowError> {
        let purged = self.store.purge_expired(deps.now()).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired flows");
        }
        Ok(purged)
    }

    /// Loads an instance of the caller's tenant that has not expired.
    async fn load(&self, deps: &Dependencies, flow_id: Uuid) -> Result<FlowInstance, FlowError> {
        let instance = self.store.load(flow_id).await?;
        if instance.tenant_id != deps.tenant_id() {
            tracing::warn!(flow_id = %flow_id, tenant_id = deps.tenant_id(), "Flow belongs to another tenant");
            return Err(FlowError::NotFound(flow_id));
        }
        if instance.is_expired(deps.now()) {
            return Err(FlowError::Expired(flow_id));
        }
        Ok(instance)
    }

    async fn commit(
        &self,
        deps: &Dependencies,
        flow_id: Uuid,
        transition: Transition,
        written: Written,
    ) -> Result<(), FlowError> {
        if let Err(e) = deps.database.commit().await {
            tracing::error!(flow_id = %flow_id, "Commit failed: {}", e);
            self.unwrite(flow_id, written).await;
            return Err(e.into());
        }
        tracing::debug!(
            flow_id = %flow_id,
            appended = transition.appended,
            events = transition.events.len(),
            complete = transition.is_complete,
            "Transition committed"
        );
        effects::dispatch(deps, flow_id, transition.events).await;
        Ok(())
    }

    /// Takes back the store write of a transaction that failed to commit.
    async fn unwrite(&self, flow_id: Uuid, written: Written) {
        let undone = match written {
            Written::Created => self.store.delete(flow_id).await,
            Written::Appended { from, to } => self.store.truncate(flow_id, from, to).await,
        };
        if let Err(e) = undone {
            tracing::error!(flow_id = %flow_id, "Could not undo flow write: {}", e);
        }
    }

    async fn output(
        &self,
        deps: &Dependencies,
        flow_id: Uuid,
        graph: &Graph,
        expires_at: DateTime<Utc>,
    ) -> Result<FlowOutput, FlowError> {
        let engine = Engine::new(deps, flow_id, self.config.max_auto_steps);
        let legal_next_inputs = engine.can_react_to(graph).await?;
        let is_complete = engine.is_complete(graph).await?;
        let data = engine.output(graph).await?;
        Ok(FlowOutput {
            flow_id,
            tenant_id: deps.tenant_id().to_string(),
            legal_next_inputs,
            data,
            is_complete,
            expires_at,
        })
    }
}

async fn rollback(deps: &Dependencies, flow_id: Uuid, err: FlowError) -> FlowError {
    match err.class() {
        authcore::ErrorClass::Service | authcore::ErrorClass::Corruption => {
            tracing::error!(flow_id = %flow_id, "Transition aborted: {}", err)
        }
        _ => tracing::debug!(flow_id = %flow_id, "Transition aborted: {}", err),
    }
    if let Err(e) = deps.database.rollback().await {
        tracing::error!(flow_id = %flow_id, "Rollback failed: {}", e);
    }
    err
}

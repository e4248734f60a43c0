use authcore::{Intent, Kind, Node, RegistryError};
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Rebuilds an intent from its persisted fields.
pub trait IntentFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Intent>, RegistryError>;
}

/// Rebuilds a node from its persisted fields.
pub trait NodeFactory: Send + Sync {
    fn kind(&self) -> &'static str;

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, RegistryError>;
}

/// Factory for any step that round-trips through serde.
pub struct SerdeFactory<T>(PhantomData<fn() -> T>);

impl<T> SerdeFactory<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<T: Kind + DeserializeOwned>(data: &serde_json::Value) -> Result<T, RegistryError> {
    serde_json::from_value(data.clone()).map_err(|e| RegistryError::Decode {
        kind: T::KIND.to_string(),
        message: e.to_string(),
    })
}

impl<T> IntentFactory for SerdeFactory<T>
where
    T: Intent + Kind + DeserializeOwned,
{
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Intent>, RegistryError> {
        Ok(Box::new(decode::<T>(data)?))
    }
}

impl<T> NodeFactory for SerdeFactory<T>
where
    T: Node + Kind + DeserializeOwned,
{
    fn kind(&self) -> &'static str {
        T::KIND
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, RegistryError> {
        Ok(Box::new(decode::<T>(data)?))
    }
}

/// Table of every intent and node kind that may appear in persisted flows.
pub struct Registry {
    intents: HashMap<&'static str, Arc<dyn IntentFactory>>,
    nodes: HashMap<&'static str, Arc<dyn NodeFactory>>,
}

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

impl Registry {
    pub fn new() -> Self {
        Self {
            intents: HashMap::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn register_intent<T>(&mut self) -> &mut Self
    where
        T: Intent + Kind + DeserializeOwned,
    {
        self.register_intent_factory(Arc::new(SerdeFactory::<T>::new()))
    }

    pub fn register_node<T>(&mut self) -> &mut Self
    where
        T: Node + Kind + DeserializeOwned,
    {
        self.register_node_factory(Arc::new(SerdeFactory::<T>::new()))
    }

    pub fn register_intent_factory(&mut self, factory: Arc<dyn IntentFactory>) -> &mut Self {
        let kind = factory.kind();
        tracing::info!("Registering intent kind: {}", kind);
        if self.intents.insert(kind, factory).is_some() {
            tracing::warn!("Intent kind {} registered twice; keeping the latest", kind);
        }
        self
    }

    pub fn register_node_factory(&mut self, factory: Arc<dyn NodeFactory>) -> &mut Self {
        let kind = factory.kind();
        tracing::info!("Registering node kind: {}", kind);
        if self.nodes.insert(kind, factory).is_some() {
            tracing::warn!("Node kind {} registered twice; keeping the latest", kind);
        }
        self
    }

    pub fn reconstruct_intent(
        &self,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<Box<dyn Intent>, RegistryError> {
        let factory = self.intents.get(kind).ok_or_else(|| RegistryError::UnknownKind {
            role: "intent",
            kind: kind.to_string(),
        })?;
        factory.create(data)
    }

    pub fn reconstruct_node(
        &self,
        kind: &str,
        data: &serde_json::Value,
    ) -> Result<Box<dyn Node>, RegistryError> {
        let factory = self.nodes.get(kind).ok_or_else(|| RegistryError::UnknownKind {
            role: "node",
            kind: kind.to_string(),
        })?;
        factory.create(data)
    }

    pub fn has_intent(&self, kind: &str) -> bool {
        self.intents.contains_key(kind)
    }

    pub fn has_node(&self, kind: &str) -> bool {
        self.nodes.contains_key(kind)
    }

    /// Registered intent kinds, sorted.
    pub fn intent_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.intents.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Registered node kinds, sorted.
    pub fn node_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.nodes.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Installs `self` as the process-wide registry. Can only happen once;
    /// the installed registry is never mutated afterwards.
    pub fn install_global(self) -> Result<Arc<Registry>, RegistryError> {
        let registry = Arc::new(self);
        GLOBAL
            .set(registry.clone())
            .map_err(|_| RegistryError::AlreadyInstalled)?;
        Ok(registry)
    }

    pub fn global() -> Option<Arc<Registry>> {
        GLOBAL.get().cloned()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

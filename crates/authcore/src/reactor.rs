use crate::events::DomainEvent;
use crate::{Dependencies, Demand, FlowError, Flows, GraphNode, Input, InputSchema};
use async_trait::async_trait;
use serde::Serialize;

/// Stable string tag identifying a concrete step type in persisted state.
pub trait Kind {
    const KIND: &'static str;
}

/// Object-safe access to [`Kind::KIND`].
pub trait KindOf {
    fn kind(&self) -> &'static str;
}

impl<T: Kind> KindOf for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }
}

/// Serializes the fields a step needs to be reconstructed later.
pub trait Persist {
    fn persist(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl<T: Serialize> Persist for T {
    fn persist(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// What a reactor is waiting for.
pub enum Reaction {
    /// External input matching one of these schemas, in declaration order.
    Inputs(Vec<Box<dyn InputSchema>>),
    /// Nothing; the reactor advances on its own.
    Auto,
    /// No further decisions.
    Done,
}

impl Reaction {
    pub fn is_done(&self) -> bool {
        matches!(self, Reaction::Done)
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reaction::Inputs(schemas) => f
                .debug_tuple("Inputs")
                .field(&schemas.iter().map(|s| s.name()).collect::<Vec<_>>())
                .finish(),
            Reaction::Auto => f.write_str("Auto"),
            Reaction::Done => f.write_str("Done"),
        }
    }
}

/// Capability set shared by intents and nodes.
///
/// Every method has a default so a concrete step only overrides what it
/// actually does. `flows.nearest` is the graph that contains the step (for an
/// intent, the graph it heads).
#[async_trait]
pub trait Reactor: KindOf + Persist + Send + Sync + 'static {
    async fn can_react_to(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Reaction, FlowError> {
        Ok(Reaction::Done)
    }

    /// `input` is `None` when responding to [`Reaction::Auto`].
    async fn react_to(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
        _input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        Err(FlowError::UnexpectedInput {
            reactor: self.kind(),
        })
    }

    /// Run-phase effects, executed inside the transaction that persists the
    /// step. For nodes this runs when the node is appended; for intents, when
    /// their flow completes.
    async fn run_effects(&self, _deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        Ok(())
    }

    /// Commit-phase effects, dispatched only after the transaction commits.
    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(Vec::new())
    }

    /// Data shown to the client alongside the legal next inputs.
    async fn output_data(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Option<serde_json::Value>, FlowError> {
        Ok(None)
    }

    /// Answers milestone lookups. See [`Demand::provide`].
    fn provide(&self, _demand: &mut Demand) {}
}

pub trait AsReactor {
    fn as_reactor(&self) -> &dyn Reactor;
}

impl<T: Reactor> AsReactor for T {
    fn as_reactor(&self) -> &dyn Reactor {
        self
    }
}

/// Decides what comes next. Heads a graph.
pub trait Intent: Reactor + AsReactor {}

/// One recorded step.
pub trait Node: Reactor + AsReactor {}

/// A transition produced by a reaction. Never persisted.
pub trait Edge: Send {
    fn instantiate(
        self: Box<Self>,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<GraphNode, FlowError>;
}

struct NodeEdge(Box<dyn Node>);

impl Edge for NodeEdge {
    fn instantiate(
        self: Box<Self>,
        _flows: Flows<'_>,
        _input: Option<&dyn Input>,
    ) -> Result<GraphNode, FlowError> {
        Ok(GraphNode::Simple(self.0))
    }
}

struct SubFlowEdge(Box<dyn Intent>);

impl Edge for SubFlowEdge {
    fn instantiate(
        self: Box<Self>,
        _flows: Flows<'_>,
        _input: Option<&dyn Input>,
    ) -> Result<GraphNode, FlowError> {
        Ok(GraphNode::SubFlow(crate::Graph::new(self.0)))
    }
}

/// Edge that appends `node` as-is.
pub fn to_node(node: impl Node) -> Box<dyn Edge> {
    Box::new(NodeEdge(Box::new(node)))
}

/// Edge that opens a sub-flow headed by `intent`.
pub fn to_sub_flow(intent: impl Intent) -> Box<dyn Edge> {
    Box::new(SubFlowEdge(Box::new(intent)))
}

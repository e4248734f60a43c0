use authcore::events::{DomainEvent, EventEnvelope};
use authcore::{Dependencies, FlowError, Flows, Graph, GraphNode, JsonPointer, Reactor};
use uuid::Uuid;

fn wrap(reactor: &dyn Reactor, pointer: &JsonPointer, err: FlowError) -> FlowError {
    FlowError::Effect {
        kind: reactor.kind(),
        pointer: pointer.clone(),
        source: Box::new(err),
    }
}

async fn run(
    deps: &Dependencies,
    reactor: &dyn Reactor,
    flows: Flows<'_>,
    pointer: &JsonPointer,
) -> Result<Vec<DomainEvent>, FlowError> {
    reactor
        .run_effects(deps, flows)
        .await
        .map_err(|e| wrap(reactor, pointer, e))?;
    reactor
        .commit_effects(deps, flows)
        .await
        .map_err(|e| wrap(reactor, pointer, e))
}

/// Runs the run-phase effects of the simple node at `index` of the graph at
/// `at`, and collects its commit-phase events.
pub(crate) async fn run_node(
    deps: &Dependencies,
    root: &Graph,
    at: &JsonPointer,
    index: usize,
) -> Result<Vec<DomainEvent>, FlowError> {
    let graph = root
        .graph_at(at)
        .ok_or_else(|| FlowError::Corrupted(format!("no flow at '{}'", at)))?;
    match graph.nodes().get(index) {
        Some(GraphNode::Simple(node)) => {
            let pointer = at.child(index);
            tracing::debug!(kind = node.kind(), pointer = %pointer, "running node effects");
            run(deps, node.as_reactor(), Flows::new(root).nested(graph), &pointer).await
        }
        Some(GraphNode::SubFlow(_)) => Ok(Vec::new()),
        None => Err(FlowError::Corrupted(format!("no node at '{}'", at.child(index)))),
    }
}

/// Runs the effects of the intent heading the graph at `at`, once that graph
/// has completed.
pub(crate) async fn run_intent(
    deps: &Dependencies,
    root: &Graph,
    at: &JsonPointer,
) -> Result<Vec<DomainEvent>, FlowError> {
    let graph = root
        .graph_at(at)
        .ok_or_else(|| FlowError::Corrupted(format!("no flow at '{}'", at)))?;
    let intent = graph.intent().as_reactor();
    tracing::debug!(kind = intent.kind(), pointer = %at, "flow completed, running intent effects");
    run(deps, intent, Flows::new(root).nested(graph), at).await
}

/// Hands committed events to the event sink. Failures are logged and never
/// undo the transition.
pub async fn dispatch(deps: &Dependencies, flow_id: Uuid, events: Vec<DomainEvent>) {
    for mut event in events {
        event.audit = deps.config.audit.is_audited(&event.kind, event.audit);
        let kind = event.kind.clone();
        let envelope = EventEnvelope::new(flow_id, deps.tenant_id(), deps.now(), event);
        if let Err(e) = deps.events.dispatch(envelope).await {
            tracing::error!(flow_id = %flow_id, kind = %kind, "Failed to dispatch event: {}", e);
        }
    }
}

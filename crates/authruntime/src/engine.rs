use crate::effects;
use authcore::events::DomainEvent;
use authcore::{
    match_input, Dependencies, FlowError, Flows, Graph, GraphNode, Input, InputDescriptor,
    JsonPointer, OfferedSchema, RawInput, Reaction, Reactor,
};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Intent,
    Node(usize),
}

/// The step currently deciding what happens next.
#[derive(Debug)]
struct Tip {
    /// Graph containing the step (for an intent, the graph it heads).
    graph: JsonPointer,
    target: Target,
    reaction: Reaction,
}

impl Tip {
    fn pointer(&self) -> JsonPointer {
        match self.target {
            Target::Intent => self.graph.clone(),
            Target::Node(index) => self.graph.child(index),
        }
    }
}

struct Resolution {
    tip: Option<Tip>,
    /// Graphs on the open chain with no decisions left, innermost first.
    completed: Vec<JsonPointer>,
}

/// Bookkeeping for one transition, used to undo appends on failure.
#[derive(Default)]
struct Progress {
    seen: HashSet<JsonPointer>,
    pushed: Vec<JsonPointer>,
    events: Vec<DomainEvent>,
    auto_steps: usize,
}

/// What one transition did.
#[derive(Debug, Default)]
pub struct Transition {
    pub appended: usize,
    /// Commit-phase events, to dispatch after the transaction commits.
    pub events: Vec<DomainEvent>,
    pub is_complete: bool,
}

/// Output of one step, addressed by its position in the flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEntry {
    pub kind: &'static str,
    pub pointer: JsonPointer,
    pub data: serde_json::Value,
}

/// Drives a single flow graph for one request.
pub struct Engine<'a> {
    deps: &'a Dependencies,
    flow_id: Uuid,
    max_auto_steps: usize,
}

impl<'a> Engine<'a> {
    pub fn new(deps: &'a Dependencies, flow_id: Uuid, max_auto_steps: usize) -> Self {
        Self {
            deps,
            flow_id,
            max_auto_steps,
        }
    }

    /// Walks the open chain innermost first. A trailing simple node that
    /// still reacts takes precedence over the intent of its graph; a graph
    /// whose intent is done hands control back to its parent.
    async fn resolve(&self, root: &Graph) -> Result<Resolution, FlowError> {
        let mut chain = vec![JsonPointer::root()];
        let mut current = root;
        while let Some(GraphNode::SubFlow(inner)) = current.last() {
            let next = chain[chain.len() - 1].child(current.nodes().len() - 1);
            chain.push(next);
            current = inner;
        }

        let mut completed = Vec::new();
        for pointer in chain.into_iter().rev() {
            let graph = root
                .graph_at(&pointer)
                .ok_or_else(|| FlowError::Corrupted(format!("no flow at '{}'", pointer)))?;
            let flows = Flows::new(root).nested(graph);

            if let Some(GraphNode::Simple(node)) = graph.last() {
                let reaction = node.can_react_to(self.deps, flows).await?;
                if !reaction.is_done() {
                    return Ok(Resolution {
                        tip: Some(Tip {
                            target: Target::Node(graph.nodes().len() - 1),
                            graph: pointer,
                            reaction,
                        }),
                        completed,
                    });
                }
            }

            let reaction = graph.intent().can_react_to(self.deps, flows).await?;
            if !reaction.is_done() {
                return Ok(Resolution {
                    tip: Some(Tip {
                        graph: pointer,
                        target: Target::Intent,
                        reaction,
                    }),
                    completed,
                });
            }
            completed.push(pointer);
        }

        Ok(Resolution {
            tip: None,
            completed,
        })
    }

    /// Legal next inputs. Empty once the flow is complete or while it only
    /// has automatic steps pending.
    pub async fn can_react_to(&self, root: &Graph) -> Result<Vec<InputDescriptor>, FlowError> {
        let resolution = self.resolve(root).await?;
        Ok(match resolution.tip {
            Some(tip) => {
                let pointer = tip.pointer();
                match tip.reaction {
                    Reaction::Inputs(schemas) => schemas
                        .into_iter()
                        .map(|schema| {
                            OfferedSchema {
                                pointer: pointer.clone(),
                                schema,
                            }
                            .describe()
                        })
                        .collect(),
                    Reaction::Auto | Reaction::Done => Vec::new(),
                }
            }
            None => Vec::new(),
        })
    }

    pub async fn is_complete(&self, root: &Graph) -> Result<bool, FlowError> {
        Ok(self.resolve(root).await?.tip.is_none())
    }

    /// Runs automatic steps on a freshly created graph.
    pub async fn start(&self, root: &mut Graph) -> Result<Transition, FlowError> {
        let mut progress = Progress::default();
        let result = self.settle(root, &mut progress).await;
        self.finish(root, progress, result.map(|tip| tip.is_none()))
    }

    /// Applies `raw` to the graph and runs every automatic step that follows.
    /// On failure the graph is left exactly as it was.
    pub async fn accept(&self, root: &mut Graph, raw: &RawInput) -> Result<Transition, FlowError> {
        let mut progress = Progress::default();
        let result = self.accept_inner(root, raw, &mut progress).await;
        self.finish(root, progress, result)
    }

    async fn accept_inner(
        &self,
        root: &mut Graph,
        raw: &RawInput,
        progress: &mut Progress,
    ) -> Result<bool, FlowError> {
        progress.seen = self.resolve(root).await?.completed.into_iter().collect();

        let tip = self
            .settle(root, progress)
            .await?
            .ok_or(FlowError::AlreadyCompleted(self.flow_id))?;

        let pointer = tip.pointer();
        let offered: Vec<OfferedSchema> = match tip.reaction {
            Reaction::Inputs(schemas) => schemas
                .into_iter()
                .map(|schema| OfferedSchema {
                    pointer: pointer.clone(),
                    schema,
                })
                .collect(),
            Reaction::Auto | Reaction::Done => Vec::new(),
        };
        let (index, input) = match_input(&offered, raw)?;
        tracing::debug!(
            flow_id = %self.flow_id,
            pointer = %pointer,
            schema = offered[index].schema.name(),
            "input matched"
        );

        self.step(root, &tip.graph, tip.target, Some(input.as_ref()), progress)
            .await?;
        Ok(self.settle(root, progress).await?.is_none())
    }

    fn finish(
        &self,
        root: &mut Graph,
        progress: Progress,
        result: Result<bool, FlowError>,
    ) -> Result<Transition, FlowError> {
        match result {
            Ok(is_complete) => Ok(Transition {
                appended: progress.pushed.len(),
                events: progress.events,
                is_complete,
            }),
            Err(e) => {
                for at in progress.pushed.iter().rev() {
                    if let Some(graph) = root.graph_at_mut(at) {
                        graph.pop();
                    }
                }
                tracing::debug!(
                    flow_id = %self.flow_id,
                    undone = progress.pushed.len(),
                    "transition failed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Runs automatic steps and intent completion effects until the flow
    /// waits for input (returned) or completes (`None`).
    async fn settle(
        &self,
        root: &mut Graph,
        progress: &mut Progress,
    ) -> Result<Option<Tip>, FlowError> {
        loop {
            let resolution = self.resolve(root).await?;
            for pointer in resolution.completed {
                if progress.seen.insert(pointer.clone()) {
                    let events = effects::run_intent(self.deps, root, &pointer).await?;
                    progress.events.extend(events);
                }
            }

            let tip = match resolution.tip {
                Some(tip) => tip,
                None => return Ok(None),
            };
            match tip.reaction {
                Reaction::Auto => {
                    progress.auto_steps += 1;
                    if progress.auto_steps > self.max_auto_steps {
                        return Err(FlowError::AutoStepLimit(self.max_auto_steps));
                    }
                    self.step(root, &tip.graph, tip.target, None, progress).await?;
                }
                Reaction::Inputs(_) | Reaction::Done => return Ok(Some(tip)),
            }
        }
    }

    /// Reacts at the given step, appends the resulting node and runs its
    /// effects.
    async fn step(
        &self,
        root: &mut Graph,
        at: &JsonPointer,
        target: Target,
        input: Option<&dyn Input>,
        progress: &mut Progress,
    ) -> Result<(), FlowError> {
        let node = {
            let graph = root
                .graph_at(at)
                .ok_or_else(|| FlowError::Corrupted(format!("no flow at '{}'", at)))?;
            let reactor: &dyn Reactor = match target {
                Target::Intent => graph.intent().as_reactor(),
                Target::Node(index) => graph
                    .nodes()
                    .get(index)
                    .map(GraphNode::reactor)
                    .ok_or_else(|| FlowError::Corrupted(format!("no node at '{}'", at.child(index))))?,
            };
            let flows = Flows::new(root).nested(graph);
            let edge = reactor.react_to(self.deps, flows, input).await?;
            edge.instantiate(flows, input)?
        };

        let graph = root
            .graph_at_mut(at)
            .ok_or_else(|| FlowError::Corrupted(format!("no flow at '{}'", at)))?;
        tracing::info!(flow_id = %self.flow_id, parent = %at, kind = node.kind(), "Appending node");
        graph.push(node);
        let index = graph.nodes().len() - 1;
        progress.pushed.push(at.clone());

        let events = effects::run_node(self.deps, root, at, index).await?;
        progress.events.extend(events);
        Ok(())
    }

    /// Output data of every step that has any. Each graph lists its intent
    /// and simple nodes, followed by its sub-flows in order.
    pub async fn output(&self, root: &Graph) -> Result<Vec<OutputEntry>, FlowError> {
        let mut entries = Vec::new();
        let mut pending = vec![JsonPointer::root()];
        while let Some(at) = pending.pop() {
            let graph = root
                .graph_at(&at)
                .ok_or_else(|| FlowError::Corrupted(format!("no flow at '{}'", at)))?;
            let flows = Flows::new(root).nested(graph);

            let intent = graph.intent();
            if let Some(data) = intent.output_data(self.deps, flows).await? {
                entries.push(OutputEntry {
                    kind: intent.kind(),
                    pointer: at.clone(),
                    data,
                });
            }

            let mut nested = Vec::new();
            for (index, node) in graph.nodes().iter().enumerate() {
                match node {
                    GraphNode::Simple(node) => {
                        if let Some(data) = node.output_data(self.deps, flows).await? {
                            entries.push(OutputEntry {
                                kind: node.kind(),
                                pointer: at.child(index),
                                data,
                            });
                        }
                    }
                    GraphNode::SubFlow(_) => nested.push(at.child(index)),
                }
            }
            pending.extend(nested.into_iter().rev());
        }
        Ok(entries)
    }
}

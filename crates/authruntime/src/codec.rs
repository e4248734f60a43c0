//! Persisted form of a flow graph.
//!
//! A graph is stored as its root intent plus a journal of node records in
//! the order they were appended. Each record names the graph it was
//! appended to, so replaying the journal in order rebuilds the same tree.

use crate::Registry;
use authcore::{FlowError, Graph, GraphNode, Intent, JsonPointer, Node};
use serde::{Deserialize, Serialize};

/// A polymorphic step: its kind tag and serialized fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindRecord {
    pub kind: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEntry {
    Simple(KindRecord),
    /// Opens a sub-flow headed by this intent.
    SubFlow(KindRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Graph the node was appended to.
    pub parent: JsonPointer,
    pub entry: NodeEntry,
}

pub fn encode_intent(intent: &dyn Intent) -> Result<KindRecord, FlowError> {
    Ok(KindRecord {
        kind: intent.kind().to_string(),
        data: intent.persist()?,
    })
}

pub fn encode_node(node: &dyn Node) -> Result<KindRecord, FlowError> {
    Ok(KindRecord {
        kind: node.kind().to_string(),
        data: node.persist()?,
    })
}

fn encode_entry(node: &GraphNode) -> Result<NodeEntry, FlowError> {
    Ok(match node {
        GraphNode::Simple(node) => NodeEntry::Simple(encode_node(node.as_ref())?),
        GraphNode::SubFlow(graph) => NodeEntry::SubFlow(encode_intent(graph.intent())?),
    })
}

/// Every node of `graph` in append order.
pub fn journal(graph: &Graph) -> Result<Vec<NodeRecord>, FlowError> {
    let mut records = Vec::with_capacity(graph.node_count());
    collect(graph, &JsonPointer::root(), &mut records)?;
    Ok(records)
}

fn collect(graph: &Graph, at: &JsonPointer, out: &mut Vec<NodeRecord>) -> Result<(), FlowError> {
    for (index, node) in graph.nodes().iter().enumerate() {
        out.push(NodeRecord {
            parent: at.clone(),
            entry: encode_entry(node)?,
        });
        if let GraphNode::SubFlow(inner) = node {
            collect(inner, &at.child(index), out)?;
        }
    }
    Ok(())
}

/// Position of the innermost graph still accepting appends: the chain of
/// trailing sub-flows from the root.
pub fn open_chain(graph: &Graph) -> JsonPointer {
    let mut pointer = JsonPointer::root();
    let mut current = graph;
    while let Some(GraphNode::SubFlow(inner)) = current.last() {
        pointer = pointer.child(current.nodes().len() - 1);
        current = inner;
    }
    pointer
}

/// Rebuilds a graph from its persisted form. Reconstructs steps only; no
/// effect is executed.
pub fn replay(
    registry: &Registry,
    root: &KindRecord,
    records: &[NodeRecord],
) -> Result<Graph, FlowError> {
    let intent = registry.reconstruct_intent(&root.kind, &root.data)?;
    let mut graph = Graph::new(intent);

    for (position, record) in records.iter().enumerate() {
        let open = open_chain(&graph);
        if !open.tokens().starts_with(record.parent.tokens()) {
            return Err(FlowError::Corrupted(format!(
                "record {} appends to '{}', which is not an open flow (open: '{}')",
                position, record.parent, open
            )));
        }
        let node = match &record.entry {
            NodeEntry::Simple(r) => GraphNode::Simple(registry.reconstruct_node(&r.kind, &r.data)?),
            NodeEntry::SubFlow(r) => {
                GraphNode::SubFlow(Graph::new(registry.reconstruct_intent(&r.kind, &r.data)?))
            }
        };
        let parent = graph.graph_at_mut(&record.parent).ok_or_else(|| {
            FlowError::Corrupted(format!("record {} has no parent flow at '{}'", position, record.parent))
        })?;
        parent.push(node);
    }

    Ok(graph)
}

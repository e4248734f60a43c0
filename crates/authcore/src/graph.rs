use crate::{Demand, Intent, JsonPointer, Milestone, Node, Reactor};
use std::fmt;

/// An append-only sequence of steps headed by one intent.
pub struct Graph {
    intent: Box<dyn Intent>,
    nodes: Vec<GraphNode>,
}

pub enum GraphNode {
    Simple(Box<dyn Node>),
    /// A nested flow headed by its own intent.
    SubFlow(Graph),
}

impl GraphNode {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphNode::Simple(node) => node.kind(),
            GraphNode::SubFlow(graph) => graph.intent.kind(),
        }
    }

    pub fn reactor(&self) -> &dyn Reactor {
        match self {
            GraphNode::Simple(node) => node.as_reactor(),
            GraphNode::SubFlow(graph) => graph.intent.as_reactor(),
        }
    }

    pub fn as_sub_flow(&self) -> Option<&Graph> {
        match self {
            GraphNode::SubFlow(graph) => Some(graph),
            GraphNode::Simple(_) => None,
        }
    }
}

/// The graphs visible to a step: the whole tree, and the graph the step
/// belongs to.
#[derive(Clone, Copy)]
pub struct Flows<'a> {
    pub root: &'a Graph,
    pub nearest: &'a Graph,
}

impl<'a> Flows<'a> {
    pub fn new(root: &'a Graph) -> Self {
        Self {
            root,
            nearest: root,
        }
    }

    pub fn nested(self, nearest: &'a Graph) -> Self {
        Self {
            root: self.root,
            nearest,
        }
    }
}

impl Graph {
    pub fn new(intent: Box<dyn Intent>) -> Self {
        Self {
            intent,
            nodes: Vec::new(),
        }
    }

    pub fn intent(&self) -> &dyn Intent {
        self.intent.as_ref()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn last(&self) -> Option<&GraphNode> {
        self.nodes.last()
    }

    pub fn push(&mut self, node: GraphNode) {
        self.nodes.push(node);
    }

    pub fn pop(&mut self) -> Option<GraphNode> {
        self.nodes.pop()
    }

    /// Number of steps in this graph and all nested sub-flows. A sub-flow
    /// counts as one step plus the steps inside it.
    pub fn node_count(&self) -> usize {
        self.nodes
            .iter()
            .map(|node| match node {
                GraphNode::Simple(_) => 1,
                GraphNode::SubFlow(graph) => 1 + graph.node_count(),
            })
            .sum()
    }

    /// Resolves a graph position. Every token must index a sub-flow.
    pub fn graph_at(&self, pointer: &JsonPointer) -> Option<&Graph> {
        let mut graph = self;
        for index in pointer.indices()? {
            graph = graph.nodes.get(index)?.as_sub_flow()?;
        }
        Some(graph)
    }

    pub fn graph_at_mut(&mut self, pointer: &JsonPointer) -> Option<&mut Graph> {
        let mut graph = self;
        for index in pointer.indices()? {
            graph = match graph.nodes.get_mut(index)? {
                GraphNode::SubFlow(inner) => inner,
                GraphNode::Simple(_) => return None,
            };
        }
        Some(graph)
    }

    /// Every step from the end of the flow back to the root intent. Nested
    /// sub-flows are walked in place; each graph's intent follows its nodes.
    pub fn traverse(&self) -> Vec<&dyn Reactor> {
        let mut out = Vec::new();
        self.collect_from_end(&mut out);
        out
    }

    fn collect_from_end<'a>(&'a self, out: &mut Vec<&'a dyn Reactor>) {
        for node in self.nodes.iter().rev() {
            match node {
                GraphNode::Simple(node) => out.push(node.as_reactor()),
                GraphNode::SubFlow(graph) => graph.collect_from_end(out),
            }
        }
        out.push(self.intent.as_reactor());
    }

    /// The milestone nearest to the end of this graph.
    pub fn find_milestone<M: Milestone>(&self) -> Option<M> {
        self.traverse().into_iter().find_map(|reactor| {
            let mut demand = Demand::new::<M>();
            reactor.provide(&mut demand);
            demand.into_value::<M>()
        })
    }

    pub fn has_milestone<M: Milestone>(&self) -> bool {
        self.traverse().into_iter().any(|reactor| {
            let mut demand = Demand::new::<M>();
            reactor.provide(&mut demand);
            demand.is_satisfied()
        })
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("intent", &self.intent.kind())
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Simple(node) => write!(f, "{}", node.kind()),
            GraphNode::SubFlow(graph) => graph.fmt(f),
        }
    }
}

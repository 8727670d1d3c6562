use crate::{EngineError, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub type NodeId = String;

/// Closed set of node categories. Resolved once when the graph is built;
/// execution dispatches on this enum, never on raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    Data,
    Processing,
    Logic,
    Actions,
    Output,
    #[serde(other)]
    Unknown,
}

/// A single workflow node. Immutable for the duration of a run; the engine
/// treats `config` as read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub category: NodeCategory,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// When true, a failure in this node is recorded but does not abort
    /// the run.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, category: NodeCategory) -> Self {
        Self {
            id: id.into(),
            category,
            label: String::new(),
            config: HashMap::new(),
            continue_on_error: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn continue_on_error(mut self, flag: bool) -> Self {
        self.continue_on_error = flag;
        self
    }
}

/// Directed dependency: `target` consumes `source`'s output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Immutable-per-run node/edge structure. Referential integrity is checked
/// at construction; acyclicity is the scheduler's concern. Deliberately not
/// deserializable: `Graph::new` is the only way in.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Build a graph, rejecting duplicate node ids and edges that reference
    /// a nonexistent node.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, EngineError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(EngineError::InvalidGraph(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        for edge in &edges {
            if !seen.contains(edge.source.as_str()) {
                return Err(EngineError::InvalidGraph(format!(
                    "edge {} references unknown source node: {}",
                    edge.id, edge.source
                )));
            }
            if !seen.contains(edge.target.as_str()) {
                return Err(EngineError::InvalidGraph(format!(
                    "edge {} references unknown target node: {}",
                    edge.id, edge.target
                )));
            }
        }

        Ok(Self { nodes, edges })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Incoming edges of `id`, in declaration order. Declaration order is
    /// what fixes fan-in merge order.
    pub fn incoming_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == id).collect()
    }

    pub fn outgoing_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == id).collect()
    }
}

//! Authored workflow graph entities (spec §3): `Workflow`, `Node`, `Edge`.
//!
//! Grounded on the teacher's `types::NodeKind` for node identity and
//! `graphs::edges::ConditionalEdge` for the idea of a predicate-routed edge,
//! generalized here to the spec's branch-label (`source_handle`) model
//! instead of an `Arc<dyn Fn>` predicate — branch selection in this domain
//! is data (a string label), not code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NodeType;

/// A stable node identifier, unique within a workflow.
pub type NodeId = String;

/// Per-type configuration blob. The storage layer treats this as an opaque
/// map (spec §9); handlers validate the expected shape at dispatch time.
pub type NodeConfig = serde_json::Map<String, Value>;

/// A single node in an authored workflow graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub config: NodeConfig,
    /// Opaque to the engine; carried only for round-tripping an authoring UI.
    #[serde(default)]
    pub position: Value,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            config: NodeConfig::new(),
            position: Value::Null,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// A directed edge between two nodes.
///
/// `source_handle` encodes a branch label: `"true"`/`"false"` for `if_else`,
/// `"pass"`/`"fail"` for `guardrails`, `"yes"`/`"no"` for `user_approval`,
/// arbitrary for `fork`. Its absence means "any/default branch" (spec §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_node: NodeId,
    pub target_node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source_node: source.into(),
            target_node: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    #[must_use]
    pub fn has_handle(&self, handle: &str) -> bool {
        self.source_handle.as_deref() == Some(handle)
    }
}

/// An authored workflow: one graph snapshot owned by a `(id, owner)` pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Workflow {
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[must_use]
    pub fn start_node(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_type.is_start())
    }

    #[must_use]
    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source_node == node_id).collect()
    }

    #[must_use]
    pub fn outgoing_with_handle(&self, node_id: &str, handle: &str) -> Vec<&Edge> {
        self.outgoing(node_id)
            .into_iter()
            .filter(|e| e.has_handle(handle))
            .collect()
    }

    #[must_use]
    pub fn outgoing_default(&self, node_id: &str) -> Vec<&Edge> {
        self.outgoing(node_id)
            .into_iter()
            .filter(|e| e.source_handle.is_none())
            .collect()
    }
}

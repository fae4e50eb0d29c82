//! Fluent builder for authoring a [`Workflow`] in code (tests, demos, seed data).
//!
//! Grounded on `graphs::builder::GraphBuilder`'s fluent-API shape, simplified
//! because this domain has no executable trait objects to register — nodes
//! and edges are plain data.

use serde_json::Value;

use crate::model::{Edge, Node, NodeConfig, Workflow};
use crate::types::NodeType;

/// Builds a [`Workflow`] node-by-node, edge-by-edge.
///
/// # Examples
///
/// ```rust
/// use workflow_engine::graph::WorkflowBuilder;
/// use workflow_engine::types::NodeType;
///
/// let workflow = WorkflowBuilder::new("wf-1", "owner-1", "greet")
///     .node("start", NodeType::Start)
///     .node("agent", NodeType::Agent)
///     .node("end", NodeType::End)
///     .edge("e1", "start", "agent")
///     .edge("e2", "agent", "end")
///     .build();
/// assert_eq!(workflow.nodes.len(), 3);
/// ```
pub struct WorkflowBuilder {
    workflow: Workflow,
}

impl WorkflowBuilder {
    #[must_use]
    pub fn new(id: impl Into<String>, owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            workflow: Workflow {
                id: id.into(),
                owner: owner.into(),
                name: name.into(),
                description: String::new(),
                nodes: Vec::new(),
                edges: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.workflow.description = description.into();
        self
    }

    #[must_use]
    pub fn node(mut self, id: impl Into<String>, node_type: NodeType) -> Self {
        self.workflow.nodes.push(Node::new(id, node_type));
        self
    }

    #[must_use]
    pub fn node_with_config(mut self, id: impl Into<String>, node_type: NodeType, config: NodeConfig) -> Self {
        self.workflow.nodes.push(Node::new(id, node_type).with_config(config));
        self
    }

    #[must_use]
    pub fn edge(mut self, id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.workflow.edges.push(Edge::new(id, source, target));
        self
    }

    #[must_use]
    pub fn edge_with_handle(
        mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        handle: impl Into<String>,
    ) -> Self {
        self.workflow.edges.push(Edge::new(id, source, target).with_handle(handle));
        self
    }

    #[must_use]
    pub fn build(self) -> Workflow {
        self.workflow
    }
}

/// Helper for building a `NodeConfig` map from JSON-like key/value pairs.
#[must_use]
pub fn config(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> NodeConfig {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

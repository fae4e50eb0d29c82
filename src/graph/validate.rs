//! Graph validation, invoked at save-time, not run-time (spec §4.9).
//!
//! The cycle-detection/topological-sort core is Kahn's algorithm, adapted
//! from `graphs::iteration::topological_sort`'s approach to the id-keyed
//! (rather than `NodeKind`-keyed) graph model used here.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use thiserror::Error;

use crate::model::Workflow;
use crate::types::NodeType;

/// Validation failures that reject a workflow at save-time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workflow contains a cycle involving node(s): {0:?}")]
    Cycle(Vec<String>),
    #[error("workflow has no start node")]
    MissingStart,
    #[error("workflow has more than one start node: {0:?}")]
    MultipleStart(Vec<String>),
    #[error("workflow has no end node")]
    MissingEnd,
    #[error("node {0} is unreachable from start")]
    UnreachableNode(String),
    #[error("edge {edge_id} references nonexistent node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },
    #[error("cognitive node {0} contains a nested cognitive node")]
    NestedCognitive(String),
    #[error("cognitive-generated graph has {count} nodes, exceeding the limit of 20")]
    TooManyNodes { count: usize },
    #[error("start node {0} must have exactly one outgoing edge, found {1}")]
    StartFanOut(String, usize),
}

/// Non-fatal observations surfaced alongside a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// An `if_else` node is missing one of its `"true"`/`"false"` branch edges.
    /// Spec §4.9: this is a warning, not an error — the missing branch is a
    /// deliberate terminal path (see scenario S3).
    IfElseMissingBranch { node_id: String, missing: &'static str },
}

/// Validate a workflow's graph structure, returning warnings on success.
pub fn validate(workflow: &Workflow) -> Result<Vec<ValidationWarning>, ValidationError> {
    validate_inner(workflow, false)
}

/// Validate a cognitive-node-generated virtual workflow (spec §4.4.8, §4.9):
/// additionally rejects nesting and caps node count at 20.
pub fn validate_virtual(workflow: &Workflow) -> Result<Vec<ValidationWarning>, ValidationError> {
    if workflow.nodes.len() > 20 {
        return Err(ValidationError::TooManyNodes { count: workflow.nodes.len() });
    }
    for node in &workflow.nodes {
        if node.node_type.is_cognitive() {
            return Err(ValidationError::NestedCognitive(node.id.clone()));
        }
    }
    validate_inner(workflow, true)
}

fn validate_inner(workflow: &Workflow, _is_virtual: bool) -> Result<Vec<ValidationWarning>, ValidationError> {
    let node_ids: FxHashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    for edge in &workflow.edges {
        if !node_ids.contains(edge.source_node.as_str()) {
            return Err(ValidationError::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.source_node.clone(),
            });
        }
        if !node_ids.contains(edge.target_node.as_str()) {
            return Err(ValidationError::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: edge.target_node.clone(),
            });
        }
    }

    let starts: Vec<String> = workflow
        .nodes
        .iter()
        .filter(|n| n.node_type.is_start())
        .map(|n| n.id.clone())
        .collect();
    match starts.len() {
        0 => return Err(ValidationError::MissingStart),
        1 => {}
        _ => return Err(ValidationError::MultipleStart(starts)),
    }
    let start_id = &starts[0];

    if !workflow.nodes.iter().any(|n| n.node_type.is_end()) {
        return Err(ValidationError::MissingEnd);
    }

    let out_count = workflow.outgoing(start_id).len();
    if out_count != 1 {
        return Err(ValidationError::StartFanOut(start_id.clone(), out_count));
    }

    let sorted = topological_sort(workflow)?;

    let reachable: FxHashSet<&str> = {
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::from([start_id.as_str()]);
        seen.insert(start_id.as_str());
        while let Some(current) = queue.pop_front() {
            for edge in workflow.outgoing(current) {
                if seen.insert(edge.target_node.as_str()) {
                    queue.push_back(edge.target_node.as_str());
                }
            }
        }
        seen
    };
    for node in &workflow.nodes {
        if !reachable.contains(node.id.as_str()) {
            return Err(ValidationError::UnreachableNode(node.id.clone()));
        }
    }
    debug_assert_eq!(sorted.len(), workflow.nodes.len());

    // A `cognitive` node's virtual workflow is LLM-generated at execution
    // time (spec §4.4.8); there is nothing to check about it at author-time
    // save validation, so it is validated separately via `validate_virtual`.

    let mut warnings = Vec::new();
    for node in workflow.nodes.iter().filter(|n| n.node_type == NodeType::IfElse) {
        let has_true = !workflow.outgoing_with_handle(&node.id, "true").is_empty();
        let has_false = !workflow.outgoing_with_handle(&node.id, "false").is_empty();
        if !has_true {
            warnings.push(ValidationWarning::IfElseMissingBranch { node_id: node.id.clone(), missing: "true" });
        }
        if !has_false {
            warnings.push(ValidationWarning::IfElseMissingBranch { node_id: node.id.clone(), missing: "false" });
        }
    }

    Ok(warnings)
}

/// Kahn's algorithm: returns a topological order, or `Err` naming every node
/// still left with nonzero in-degree once the frontier is exhausted (those
/// are exactly the nodes participating in a cycle).
fn topological_sort(workflow: &Workflow) -> Result<Vec<String>, ValidationError> {
    let mut in_degree: FxHashMap<&str, usize> = FxHashMap::default();
    for node in &workflow.nodes {
        in_degree.entry(node.id.as_str()).or_insert(0);
    }
    for edge in &workflow.edges {
        *in_degree.entry(edge.target_node.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    let mut ordered = Vec::with_capacity(workflow.nodes.len());

    while let Some(id) = queue.pop_front() {
        ordered.push(id.to_string());
        for edge in workflow.outgoing(id) {
            let deg = in_degree.get_mut(edge.target_node.as_str()).expect("validated target exists");
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(edge.target_node.as_str());
            }
        }
    }

    if ordered.len() != workflow.nodes.len() {
        let remaining: Vec<String> = in_degree
            .iter()
            .filter(|(id, deg)| **deg > 0 && !ordered.contains(&id.to_string()))
            .map(|(id, _)| id.to_string())
            .collect();
        return Err(ValidationError::Cycle(remaining));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowBuilder;

    #[test]
    fn linear_workflow_is_valid() {
        let wf = WorkflowBuilder::new("w", "o", "n")
            .node("start", NodeType::Start)
            .node("agent", NodeType::Agent)
            .node("end", NodeType::End)
            .edge("e1", "start", "agent")
            .edge("e2", "agent", "end")
            .build();
        assert!(validate(&wf).unwrap().is_empty());
    }

    #[test]
    fn rejects_cycles() {
        let wf = WorkflowBuilder::new("w", "o", "n")
            .node("start", NodeType::Start)
            .node("a", NodeType::Agent)
            .node("b", NodeType::Agent)
            .node("end", NodeType::End)
            .edge("e1", "start", "a")
            .edge("e2", "a", "b")
            .edge("e3", "b", "a")
            .edge("e4", "b", "end")
            .build();
        assert!(matches!(validate(&wf), Err(ValidationError::Cycle(_))));
    }

    #[test]
    fn rejects_missing_start() {
        let wf = WorkflowBuilder::new("w", "o", "n").node("end", NodeType::End).build();
        assert_eq!(validate(&wf), Err(ValidationError::MissingStart));
    }

    #[test]
    fn rejects_unreachable_node() {
        let wf = WorkflowBuilder::new("w", "o", "n")
            .node("start", NodeType::Start)
            .node("a", NodeType::Agent)
            .node("orphan", NodeType::Agent)
            .node("end", NodeType::End)
            .edge("e1", "start", "a")
            .edge("e2", "a", "end")
            .build();
        assert!(matches!(validate(&wf), Err(ValidationError::UnreachableNode(_))));
    }

    #[test]
    fn if_else_missing_branch_is_a_warning_not_an_error() {
        let wf = WorkflowBuilder::new("w", "o", "n")
            .node("start", NodeType::Start)
            .node("check", NodeType::IfElse)
            .node("end_true", NodeType::End)
            .edge("e1", "start", "check")
            .edge_with_handle("e2", "check", "end_true", "true")
            .build();
        let warnings = validate(&wf).unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::IfElseMissingBranch { missing: "false", .. }
        )));
    }

    #[test]
    fn virtual_workflow_rejects_nested_cognitive() {
        let wf = WorkflowBuilder::new("w", "o", "n")
            .node("start", NodeType::Start)
            .node("think", NodeType::Cognitive)
            .node("end", NodeType::End)
            .edge("e1", "start", "think")
            .edge("e2", "think", "end")
            .build();
        assert!(matches!(validate_virtual(&wf), Err(ValidationError::NestedCognitive(_))));
    }
}

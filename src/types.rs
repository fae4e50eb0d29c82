//! Core types for the workflow execution engine.
//!
//! This module defines the fundamental vocabulary used throughout the crate:
//! the set of node types a workflow graph can be built from.
//!
//! # Examples
//!
//! ```rust
//! use workflow_engine::types::NodeType;
//!
//! let agent = NodeType::Agent;
//! let encoded = agent.encode();
//! assert_eq!(encoded, "Agent");
//! assert_eq!(NodeType::decode(&encoded), agent);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the behavior a [`crate::model::Node`] dispatches to at execution time.
///
/// Every node in an authored workflow graph is tagged with exactly one of
/// these. `Start` and `End` are structural bookends; the rest drive
/// `node::Handler` dispatch in the engine loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Entry point. Exactly one per workflow; emits `output = input` unchanged.
    Start,
    /// Terminal point. At least one per workflow; signals run completion.
    End,
    /// LLM call with optional tool invocation loop.
    Agent,
    /// Binary branch on a resolved comparison.
    IfElse,
    /// LLM-judged pass/fail policy check.
    Guardrails,
    /// Fan-out to every outgoing edge as an independent job.
    Fork,
    /// Suspends the run pending an external yes/no decision.
    UserApproval,
    /// LLM-synthesized nested virtual workflow, executed inline.
    Cognitive,
}

impl NodeType {
    /// Encode a `NodeType` into its persisted string form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeType::Start => "Start",
            NodeType::End => "End",
            NodeType::Agent => "Agent",
            NodeType::IfElse => "IfElse",
            NodeType::Guardrails => "Guardrails",
            NodeType::Fork => "Fork",
            NodeType::UserApproval => "UserApproval",
            NodeType::Cognitive => "Cognitive",
        }
        .to_string()
    }

    /// Decode a persisted string form back into a `NodeType`.
    ///
    /// # Errors
    ///
    /// Returns `None` for unrecognized strings; callers should treat this as
    /// a `Fail`-worthy configuration error rather than guess at intent.
    #[must_use]
    pub fn decode(s: &str) -> Option<Self> {
        Some(match s {
            "Start" => NodeType::Start,
            "End" => NodeType::End,
            "Agent" => NodeType::Agent,
            "IfElse" => NodeType::IfElse,
            "Guardrails" => NodeType::Guardrails,
            "Fork" => NodeType::Fork,
            "UserApproval" => NodeType::UserApproval,
            "Cognitive" => NodeType::Cognitive,
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    #[must_use]
    pub fn is_cognitive(&self) -> bool {
        matches!(self, Self::Cognitive)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl TryFrom<&str> for NodeType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        NodeType::decode(s).ok_or_else(|| format!("unknown node type: {s}"))
    }
}

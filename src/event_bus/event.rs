//! Lifecycle events published by the engine loop (spec §4.5, §6).
//!
//! Grounded on the teacher's `Event` enum shape (`to_json_value`, `Display`,
//! serde round-tripping) but replacing the generic node/diagnostic/LLM-stream
//! taxonomy with the engine's eight fixed lifecycle kinds. `event_type` is
//! the wire discriminator the spec calls for in its event table (§6).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::NodeType;

/// One lifecycle event for a single workflow, as published by the engine
/// loop and forwarded by the WebSocket broadcaster (spec §4.5, §4.6).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    /// Handshake sent by the WS layer to a client on connect (spec §4.6).
    Connected { workflow_id: String },
    RunStarted {
        run_id: Uuid,
        workflow_id: String,
        initial_input: Value,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: Uuid,
        workflow_id: String,
        node_id: String,
        node_type: NodeType,
        input_data: Value,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        run_id: Uuid,
        workflow_id: String,
        node_id: String,
        node_type: NodeType,
        output_data: Value,
        duration_ms: i64,
        timestamp: DateTime<Utc>,
    },
    NodeError {
        run_id: Uuid,
        workflow_id: String,
        node_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    ApprovalNeeded {
        run_id: Uuid,
        workflow_id: String,
        node_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        run_id: Uuid,
        workflow_id: String,
        final_output: Value,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        run_id: Uuid,
        workflow_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// The workflow this event belongs to — the WS broadcaster's filter key
    /// (spec §4.6: "forwards to connected clients filtered by workflow id").
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        match self {
            Event::Connected { workflow_id }
            | Event::RunStarted { workflow_id, .. }
            | Event::NodeStarted { workflow_id, .. }
            | Event::NodeCompleted { workflow_id, .. }
            | Event::NodeError { workflow_id, .. }
            | Event::ApprovalNeeded { workflow_id, .. }
            | Event::RunCompleted { workflow_id, .. }
            | Event::RunFailed { workflow_id, .. } => workflow_id,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Event::Connected { .. } => None,
            Event::RunStarted { run_id, .. }
            | Event::NodeStarted { run_id, .. }
            | Event::NodeCompleted { run_id, .. }
            | Event::NodeError { run_id, .. }
            | Event::ApprovalNeeded { run_id, .. }
            | Event::RunCompleted { run_id, .. }
            | Event::RunFailed { run_id, .. } => Some(*run_id),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connected { .. } => "connected",
            Event::RunStarted { .. } => "run_started",
            Event::NodeStarted { .. } => "node_started",
            Event::NodeCompleted { .. } => "node_completed",
            Event::NodeError { .. } => "node_error",
            Event::ApprovalNeeded { .. } => "approval_needed",
            Event::RunCompleted { .. } => "run_completed",
            Event::RunFailed { .. } => "run_failed",
        }
    }

    /// Wire-format JSON: `serde`'s internally-tagged encoding already puts
    /// `event_type` at the top level per spec §6; this is a convenience
    /// wrapper matching the teacher's `to_json_value`/`to_json_string` pair.
    pub fn to_json_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.workflow_id(), self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_carries_event_type_discriminator() {
        let event = Event::NodeStarted {
            run_id: Uuid::nil(),
            workflow_id: "wf-1".into(),
            node_id: "start".into(),
            node_type: NodeType::Start,
            input_data: json!({}),
            timestamp: Utc::now(),
        };
        let value = event.to_json_value();
        assert_eq!(value["event_type"], "node_started");
        assert_eq!(value["node_id"], "start");
    }

    #[test]
    fn workflow_id_accessor_covers_every_variant() {
        let event = Event::Connected { workflow_id: "wf-1".into() };
        assert_eq!(event.workflow_id(), "wf-1");
        assert_eq!(event.run_id(), None);
    }
}

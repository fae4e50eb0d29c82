//! LLM provider and tool-execution trait boundary.
//!
//! Concrete provider integration is out of scope; this module defines the
//! contract node handlers depend on, plus [`EchoProvider`], a stub used by
//! tests and the `stub-echo` model referenced in end-to-end scenarios.
//! Grounded on the teacher's `rig-core`-backed agent node (`demo6_agent_mcp.rs`,
//! `demo1`-family demos), with the concrete crate swapped for a trait object
//! since no specific provider is in scope.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

/// A tool an agent node may call, presented to the LLM as a callable function.
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
}

/// A single tool invocation requested by the LLM.
#[derive(Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    pub tool_id: String,
    pub arguments: Value,
}

/// One full tool round trip, recorded into a `LedgerEntry.tool_calls` (spec §4.4.3).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolCallRecord {
    pub tool_id: String,
    pub arguments: Value,
    pub result: Value,
}

/// What the LLM did with the conversation it was given.
#[derive(Clone, Debug)]
pub enum LlmResponse {
    /// A final textual answer; the agent loop of spec §4.4.3 stops here.
    Message(String),
    /// The LLM wants one or more tools invoked before it will answer.
    ToolCalls(Vec<ToolCall>),
}

#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    /// Connection errors, timeouts, 5xx — spec §7 retries these up to 3 times
    /// with backoff before the handler gives up and `Fail`s.
    #[error("transient LLM/tool error: {0}")]
    #[diagnostic(code(workflow_engine::llm::transient))]
    Transient(String),

    /// Malformed request, unknown model, schema violation — not retried.
    #[error("LLM/tool error: {0}")]
    #[diagnostic(code(workflow_engine::llm::fatal))]
    Fatal(String),
}

impl LlmError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transient(_))
    }
}

/// Invokes a language model over a running conversation, optionally offering
/// tools. Implementations own their own retry-unsafe transport details;
/// the tool-call loop and retry-with-backoff policy live in the agent
/// handler (spec §4.4.3, §5).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, model: &str, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmResponse, LlmError>;
}

/// Executes a single tool call and returns its JSON result (spec §4.4.3
/// step 3: "engine calls a tool-execution interface passing
/// `(tool_id, arguments)` and gets back a JSON result").
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_id: &str, arguments: Value) -> Result<Value, LlmError>;
    async fn definition(&self, tool_id: &str) -> Result<ToolDefinition, LlmError>;
}

/// Deterministic stub provider: echoes the user prompt back as its message
/// and never requests a tool call. Matches scenario S1's `llm_model:
/// "stub-echo"` and is the default provider for tests and demos lacking a
/// real model.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn complete(&self, _model: &str, messages: &[Message], _tools: &[ToolDefinition]) -> Result<LlmResponse, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.has_role(Message::USER))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LlmResponse::Message(last_user))
    }
}

/// A tool executor with no tools registered; any call is `Fatal`. Useful
/// alongside [`EchoProvider`] for agent nodes configured with `tools: []`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopToolExecutor;

#[async_trait]
impl ToolExecutor for NoopToolExecutor {
    async fn execute(&self, tool_id: &str, _arguments: Value) -> Result<Value, LlmError> {
        Err(LlmError::Fatal(format!("no such tool: {tool_id}")))
    }

    async fn definition(&self, tool_id: &str) -> Result<ToolDefinition, LlmError> {
        Err(LlmError::Fatal(format!("no such tool: {tool_id}")))
    }
}

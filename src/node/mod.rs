//! Node handler framework (spec §4.4): one [`Handler`] per node type,
//! dispatched from the engine loop by [`NodeType`].
//!
//! Mirrors the teacher's `Node` trait shape (`run(&self, snapshot, ctx) ->
//! Result<NodePartial, NodeError>`), generalized to the engine's three-way
//! outcome — continue, suspend, fail — instead of a single `Result`, since
//! spec §4.1 step 4 requires handlers to signal suspension (approval gates)
//! distinctly from both success and failure.

pub mod agent;
pub mod cognitive;
pub mod end;
pub mod fork;
pub mod guardrails;
pub mod if_else;
pub mod start;
pub mod user_approval;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::context::Context;
use crate::llm::{LlmError, LlmProvider, LlmResponse, ToolDefinition, ToolExecutor};
use crate::message::Message;
use crate::model::Node;
use crate::types::NodeType;

/// Default tool-call loop cap for agent nodes (spec §4.4.3, §5).
pub const DEFAULT_TOOL_CALL_CAP: usize = 8;

/// Default per-node wall-clock budget (spec §5): 5 minutes. Enforced by the
/// engine loop wrapping `dispatch` in a timeout, not by handlers themselves.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default LLM/tool transient-error retry budget (spec §5, §7).
pub const DEFAULT_LLM_MAX_RETRIES: u32 = 3;

/// Shared dependencies every handler may need: the LLM/tool boundary, the
/// configured tool-call loop cap, and the retry budget for transient LLM/tool
/// errors. Both caps default to the spec's constants and are overridden from
/// [`crate::config::EngineConfig`] by callers that build one.
#[derive(Clone)]
pub struct HandlerEnv {
    pub llm: Arc<dyn LlmProvider>,
    pub tools: Arc<dyn ToolExecutor>,
    pub tool_call_cap: usize,
    pub llm_max_retries: u32,
}

impl HandlerEnv {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            llm,
            tools,
            tool_call_cap: DEFAULT_TOOL_CALL_CAP,
            llm_max_retries: DEFAULT_LLM_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_tool_call_cap(mut self, cap: usize) -> Self {
        self.tool_call_cap = cap;
        self
    }

    #[must_use]
    pub fn with_llm_max_retries(mut self, max_retries: u32) -> Self {
        self.llm_max_retries = max_retries;
        self
    }
}

/// Which outgoing edges to follow after an [`Outcome::Continue`] (spec §3:
/// `source_handle` encodes branch labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextNodes {
    /// Every outgoing edge regardless of `source_handle` (start, agent, fork, cognitive).
    All,
    /// Only edges whose `source_handle` equals this branch label (if_else, guardrails, user_approval).
    Handle(&'static str),
    /// No successors (end).
    None,
}

/// What a handler did with its node (spec §4.1 step 4).
pub enum Outcome {
    Continue {
        produced: FxHashMap<String, Value>,
        next: NextNodes,
        tool_calls: Option<Value>,
    },
    Suspend {
        message: String,
    },
    Fail {
        error: String,
    },
}

/// A single node type's execution function.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, node: &Node, ctx: &Context, env: &HandlerEnv) -> Outcome;
}

/// Dispatch a node to its handler by [`NodeType`] (spec §4.1 step 4). Also
/// used by the `cognitive` handler to walk a virtual workflow inline with
/// the same machinery the real engine loop uses.
pub async fn dispatch(node: &Node, ctx: &Context, env: &HandlerEnv) -> Outcome {
    match node.node_type {
        NodeType::Start => start::StartHandler.run(node, ctx, env).await,
        NodeType::End => end::EndHandler.run(node, ctx, env).await,
        NodeType::Agent => agent::AgentHandler.run(node, ctx, env).await,
        NodeType::IfElse => if_else::IfElseHandler.run(node, ctx, env).await,
        NodeType::Guardrails => guardrails::GuardrailsHandler.run(node, ctx, env).await,
        NodeType::Fork => fork::ForkHandler.run(node, ctx, env).await,
        NodeType::UserApproval => user_approval::UserApprovalHandler.run(node, ctx, env).await,
        NodeType::Cognitive => cognitive::CognitiveHandler.run(node, ctx, env).await,
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(200 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Invoke the LLM, retrying transient failures with exponential backoff.
/// Fatal errors are returned immediately without retry (spec §7).
pub(crate) async fn complete_with_retry(
    env: &HandlerEnv,
    model: &str,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> Result<LlmResponse, String> {
    let mut attempt = 0;
    loop {
        match env.llm.complete(model, messages, tools).await {
            Ok(response) => return Ok(response),
            Err(LlmError::Transient(_)) if attempt < env.llm_max_retries => {
                attempt += 1;
                tokio::time::sleep(backoff(attempt)).await;
            }
            Err(err) => return Err(err.to_string()),
        }
    }
}

/// Invoke a tool, retrying transient failures with exponential backoff.
pub(crate) async fn execute_with_retry(env: &HandlerEnv, tool_id: &str, arguments: Value) -> Result<Value, String> {
    let mut attempt = 0;
    loop {
        match env.tools.execute(tool_id, arguments.clone()).await {
            Ok(result) => return Ok(result),
            Err(LlmError::Transient(_)) if attempt < env.llm_max_retries => {
                attempt += 1;
                tokio::time::sleep(backoff(attempt)).await;
            }
            Err(err) => return Err(err.to_string()),
        }
    }
}

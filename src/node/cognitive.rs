//! The `cognitive` handler (spec §4.4.8): an LLM synthesizes a nested
//! virtual workflow, which this handler then walks inline — same
//! handler-dispatch machinery as the engine loop, but against an in-memory
//! context with no separate queue jobs or ledger entries (spec §9: "keeps
//! the outer ledger readable and avoids run-inside-run state modeling").

use std::collections::VecDeque;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::Context;
use crate::graph::validate_virtual;
use crate::llm::LlmResponse;
use crate::message::Message;
use crate::model::{Edge, Node, Workflow};
use crate::template;

use super::{Handler, HandlerEnv, NextNodes, Outcome, complete_with_retry, dispatch};

const COGNITIVE_MODEL: &str = "cognitive-planner";

const META_PROMPT: &str = "Design a small workflow graph to accomplish the given instruction. \
    Respond with ONLY a JSON object {\"nodes\": [...], \"edges\": [...]} using this system's node/edge \
    schema (node `type` one of start, end, agent, if_else, guardrails, fork, user_approval; no nested \
    cognitive nodes; at most 20 nodes; exactly one start and at least one end; no cycles).";

#[derive(Deserialize)]
struct VirtualGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CognitiveHandler;

#[async_trait]
impl Handler for CognitiveHandler {
    async fn run(&self, node: &Node, ctx: &Context, env: &HandlerEnv) -> Outcome {
        let input = ctx.to_value();

        let Some(instruction_tpl) = node.config_str("cognitive_instruction") else {
            return Outcome::Fail {
                error: "cognitive node missing cognitive_instruction config".into(),
            };
        };
        let instruction = template::resolve(instruction_tpl, &input);

        let messages = vec![Message::system(META_PROMPT), Message::user(&instruction)];
        let response = match complete_with_retry(env, COGNITIVE_MODEL, &messages, &[]).await {
            Ok(response) => response,
            Err(error) => return Outcome::Fail { error },
        };
        let LlmResponse::Message(text) = response else {
            return Outcome::Fail {
                error: "cognitive planner requested a tool call".into(),
            };
        };

        let graph: VirtualGraph = match serde_json::from_str(&text) {
            Ok(graph) => graph,
            Err(err) => {
                return Outcome::Fail {
                    error: format!("cognitive-generated graph parse failure: {err}"),
                };
            }
        };

        let workflow = Workflow {
            id: format!("{}::virtual", node.id),
            owner: String::new(),
            name: String::new(),
            description: String::new(),
            nodes: graph.nodes,
            edges: graph.edges,
        };

        if let Err(err) = validate_virtual(&workflow) {
            return Outcome::Fail {
                error: format!("cognitive-generated graph invalid: {err}"),
            };
        }

        let Some(start_id) = workflow.start_node().map(|n| n.id.clone()) else {
            return Outcome::Fail {
                error: "cognitive-generated graph has no start node".into(),
            };
        };

        match run_virtual(&workflow, &start_id, ctx.clone(), env).await {
            Ok((final_output, trace)) => {
                let mut produced = FxHashMap::default();
                produced.insert("cognitive_output".to_string(), final_output);
                Outcome::Continue {
                    produced,
                    next: NextNodes::All,
                    tool_calls: Some(json!(trace)),
                }
            }
            Err(error) => Outcome::Fail { error },
        }
    }
}

/// Walks the virtual workflow breadth-first, dispatching through the same
/// [`super::dispatch`] the real engine loop uses. Returns the first `end`
/// node's output plus a trace of every step for the outer ledger's
/// `tool_calls` column.
async fn run_virtual(
    workflow: &Workflow,
    start_id: &str,
    outer_ctx: Context,
    env: &HandlerEnv,
) -> Result<(Value, Vec<Value>), String> {
    let mut pending: VecDeque<(String, Context)> = VecDeque::new();
    pending.push_back((start_id.to_string(), outer_ctx));
    let mut trace = Vec::new();

    while let Some((node_id, ctx)) = pending.pop_front() {
        let Some(virtual_node) = workflow.node(&node_id) else {
            return Err(format!("cognitive-generated graph references unknown node {node_id}"));
        };

        match dispatch(virtual_node, &ctx, env).await {
            Outcome::Suspend { .. } => {
                return Err(format!(
                    "cognitive-generated graph node {node_id} suspended; virtual workflows cannot pause"
                ));
            }
            Outcome::Fail { error } => return Err(error),
            Outcome::Continue { produced, next, .. } => {
                let next_ctx = ctx.merged(produced);
                trace.push(json!({
                    "node_id": node_id,
                    "node_type": virtual_node.node_type,
                    "output": next_ctx.to_value(),
                }));

                if virtual_node.node_type.is_end() {
                    return Ok((next_ctx.to_value(), trace));
                }

                let next_ids: Vec<String> = match next {
                    NextNodes::None => Vec::new(),
                    NextNodes::All => workflow.outgoing(&node_id).into_iter().map(|e| e.target_node.clone()).collect(),
                    NextNodes::Handle(handle) => workflow
                        .outgoing_with_handle(&node_id, handle)
                        .into_iter()
                        .map(|e| e.target_node.clone())
                        .collect(),
                };
                for next_id in next_ids {
                    pending.push_back((next_id, next_ctx.clone()));
                }
            }
        }
    }

    Err("cognitive-generated graph never reached an end node".to_string())
}

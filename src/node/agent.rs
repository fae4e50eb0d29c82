//! The `agent` handler (spec §4.4.3): LLM call with an optional tool-call
//! loop, capped at `env.tool_call_cap` round trips (default 8; scenario S6).

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::context::Context;
use crate::llm::{LlmResponse, ToolCallRecord, ToolDefinition};
use crate::message::Message;
use crate::model::Node;
use crate::template;

use super::{Handler, HandlerEnv, NextNodes, Outcome, complete_with_retry, execute_with_retry};

#[derive(Clone, Copy, Debug, Default)]
pub struct AgentHandler;

#[async_trait]
impl Handler for AgentHandler {
    async fn run(&self, node: &Node, ctx: &Context, env: &HandlerEnv) -> Outcome {
        let input = ctx.to_value();

        let Some(model) = node.config_str("llm_model") else {
            return Outcome::Fail {
                error: "agent node missing llm_model config".into(),
            };
        };
        let system_prompt = node.config_str("system_prompt").unwrap_or_default();
        let user_prompt = node.config_str("user_prompt").unwrap_or_default();
        let structured_output = node
            .config
            .get("structured_output")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let tool_ids: Vec<String> = node
            .config
            .get("tools")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        let mut tools: Vec<ToolDefinition> = Vec::with_capacity(tool_ids.len());
        for tool_id in &tool_ids {
            match env.tools.definition(tool_id).await {
                Ok(def) => tools.push(def),
                Err(err) => return Outcome::Fail { error: err.to_string() },
            }
        }

        let mut messages = vec![
            Message::system(&template::resolve(system_prompt, &input)),
            Message::user(&template::resolve(user_prompt, &input)),
        ];

        let mut recorded_calls: Vec<ToolCallRecord> = Vec::new();
        let mut iterations: usize = 0;

        let final_text = loop {
            let response = match complete_with_retry(env, model, &messages, &tools).await {
                Ok(response) => response,
                Err(error) => return Outcome::Fail { error },
            };

            match response {
                LlmResponse::Message(text) => break text,
                LlmResponse::ToolCalls(calls) => {
                    iterations += 1;
                    if iterations > env.tool_call_cap {
                        return Outcome::Fail {
                            error: "tool_call_limit_exceeded".into(),
                        };
                    }
                    for call in calls {
                        let result = match execute_with_retry(env, &call.tool_id, call.arguments.clone()).await {
                            Ok(result) => result,
                            Err(error) => return Outcome::Fail { error },
                        };
                        messages.push(Message::assistant(&format!(
                            "[tool_call:{}] {}",
                            call.tool_id, call.arguments
                        )));
                        messages.push(Message::user(&format!("[tool_result:{}] {}", call.tool_id, result)));
                        recorded_calls.push(ToolCallRecord {
                            tool_id: call.tool_id,
                            arguments: call.arguments,
                            result,
                        });
                    }
                }
            }
        };

        let structured = if structured_output {
            match serde_json::from_str::<Value>(&final_text) {
                Ok(value) => Some(value),
                Err(err) => {
                    return Outcome::Fail {
                        error: format!("structured_output parse failure: {err}"),
                    };
                }
            }
        } else {
            None
        };

        let tool_calls_value = json!(recorded_calls);

        let mut produced = FxHashMap::default();
        produced.insert("message".to_string(), json!(final_text));
        produced.insert("tool_calls".to_string(), tool_calls_value.clone());
        if let Some(structured) = structured {
            produced.insert("structured".to_string(), structured);
        }

        Outcome::Continue {
            produced,
            next: NextNodes::All,
            tool_calls: Some(tool_calls_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EchoProvider, LlmError, LlmProvider, NoopToolExecutor, ToolCall};
    use crate::model::NodeConfig;
    use crate::types::NodeType;
    use async_trait::async_trait as at;
    use std::sync::Arc;

    fn agent_node(config: NodeConfig) -> Node {
        Node::new("agent", NodeType::Agent).with_config(config)
    }

    #[tokio::test]
    async fn echo_agent_produces_message_and_merges_input() {
        let mut config = NodeConfig::new();
        config.insert("llm_model".into(), json!("stub-echo"));
        config.insert("system_prompt".into(), json!("Greet {{input.name}}"));
        config.insert("user_prompt".into(), json!("hi"));
        config.insert("tools".into(), json!([]));

        let node = agent_node(config);
        let ctx = Context::from_value(json!({"name": "Ada"}));
        let env = HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor));

        match AgentHandler.run(&node, &ctx, &env).await {
            Outcome::Continue { produced, next, .. } => {
                assert_eq!(produced["message"], json!("hi"));
                assert_eq!(next, NextNodes::All);
            }
            _ => panic!("expected Continue"),
        }
    }

    struct AlwaysToolCall;

    #[at]
    impl LlmProvider for AlwaysToolCall {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::ToolCalls(vec![ToolCall {
                id: "call-1".into(),
                tool_id: "noop".into(),
                arguments: json!({}),
            }]))
        }
    }

    struct AlwaysOkTool;

    #[at]
    impl crate::llm::ToolExecutor for AlwaysOkTool {
        async fn execute(&self, _tool_id: &str, _arguments: Value) -> Result<Value, LlmError> {
            Ok(json!({"ok": true}))
        }

        async fn definition(&self, tool_id: &str) -> Result<ToolDefinition, LlmError> {
            Ok(ToolDefinition {
                id: tool_id.to_string(),
                name: tool_id.to_string(),
                description: String::new(),
                parameters_schema: json!({}),
            })
        }
    }

    #[tokio::test]
    async fn tool_call_loop_cap_exceeded_fails() {
        let mut config = NodeConfig::new();
        config.insert("llm_model".into(), json!("always-tool-call"));
        config.insert("tools".into(), json!(["noop"]));

        let node = agent_node(config);
        let ctx = Context::from_value(json!({}));
        let env = HandlerEnv::new(Arc::new(AlwaysToolCall), Arc::new(AlwaysOkTool));

        match AgentHandler.run(&node, &ctx, &env).await {
            Outcome::Fail { error } => assert_eq!(error, "tool_call_limit_exceeded"),
            _ => panic!("expected Fail"),
        }
    }
}

//! The `guardrails` handler (spec §4.4.5): LLM-judged pass/fail policy check.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::json;

use crate::context::Context;
use crate::llm::LlmResponse;
use crate::message::Message;
use crate::model::Node;
use crate::template;

use super::{Handler, HandlerEnv, NextNodes, Outcome, complete_with_retry};

const GUARDRAILS_MODEL: &str = "guardrails-judge";

const META_PROMPT: &str = "You are a policy guardrail. Judge whether the given input satisfies \
    the given policy. Respond with ONLY a JSON object of the shape \
    {\"pass\": bool, \"reason\": string} and nothing else.";

#[derive(Deserialize)]
struct Verdict {
    pass: bool,
    reason: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GuardrailsHandler;

#[async_trait]
impl Handler for GuardrailsHandler {
    async fn run(&self, node: &Node, ctx: &Context, env: &HandlerEnv) -> Outcome {
        let input = ctx.to_value();

        let Some(guardrail_tpl) = node.config_str("guardrail") else {
            return Outcome::Fail {
                error: "guardrails node missing guardrail config".into(),
            };
        };
        let guardrail_text = template::resolve(guardrail_tpl, &input);

        let messages = vec![
            Message::system(META_PROMPT),
            Message::user(&format!("Policy: {guardrail_text}\nInput: {input}")),
        ];

        let response = match complete_with_retry(env, GUARDRAILS_MODEL, &messages, &[]).await {
            Ok(response) => response,
            Err(error) => return Outcome::Fail { error },
        };

        let text = match response {
            LlmResponse::Message(text) => text,
            LlmResponse::ToolCalls(_) => {
                return Outcome::Fail {
                    error: "guardrails model requested a tool call".into(),
                };
            }
        };

        let verdict: Verdict = match serde_json::from_str(&text) {
            Ok(verdict) => verdict,
            Err(err) => {
                return Outcome::Fail {
                    error: format!("guardrail verdict parse failure: {err}"),
                };
            }
        };

        let mut produced = FxHashMap::default();
        produced.insert("guardrail_pass".to_string(), json!(verdict.pass));
        produced.insert("guardrail_reason".to_string(), json!(verdict.reason));

        let handle = if verdict.pass { "pass" } else { "fail" };
        Outcome::Continue {
            produced,
            next: NextNodes::Handle(handle),
            tool_calls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, LlmProvider, NoopToolExecutor, ToolDefinition};
    use crate::model::NodeConfig;
    use crate::types::NodeType;
    use async_trait::async_trait as at;
    use std::sync::Arc;

    struct StubJudge(&'static str);

    #[at]
    impl LlmProvider for StubJudge {
        async fn complete(
            &self,
            _model: &str,
            _messages: &[Message],
            _tools: &[ToolDefinition],
        ) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse::Message(self.0.to_string()))
        }
    }

    #[tokio::test]
    async fn pass_verdict_routes_to_pass_handle() {
        let mut config = NodeConfig::new();
        config.insert("guardrail".into(), json!("no profanity"));
        let node = Node::new("guard", NodeType::Guardrails).with_config(config);
        let ctx = Context::from_value(json!({}));
        let env = HandlerEnv::new(
            Arc::new(StubJudge(r#"{"pass": true, "reason": "clean"}"#)),
            Arc::new(NoopToolExecutor),
        );

        match GuardrailsHandler.run(&node, &ctx, &env).await {
            Outcome::Continue { produced, next, .. } => {
                assert_eq!(produced["guardrail_pass"], json!(true));
                assert_eq!(next, NextNodes::Handle("pass"));
            }
            _ => panic!("expected Continue"),
        }
    }

    #[tokio::test]
    async fn malformed_verdict_fails() {
        let mut config = NodeConfig::new();
        config.insert("guardrail".into(), json!("no profanity"));
        let node = Node::new("guard", NodeType::Guardrails).with_config(config);
        let ctx = Context::from_value(json!({}));
        let env = HandlerEnv::new(Arc::new(StubJudge("not json")), Arc::new(NoopToolExecutor));

        assert!(matches!(GuardrailsHandler.run(&node, &ctx, &env).await, Outcome::Fail { .. }));
    }
}

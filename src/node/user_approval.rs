//! The `user_approval` handler (spec §4.4.7, §4.8): suspends the run pending
//! an external yes/no decision, then resumes on re-entry as a new job.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::context::Context;
use crate::model::Node;
use crate::template;

use super::{Handler, HandlerEnv, NextNodes, Outcome};

#[derive(Clone, Copy, Debug, Default)]
pub struct UserApprovalHandler;

#[async_trait]
impl Handler for UserApprovalHandler {
    async fn run(&self, node: &Node, ctx: &Context, _env: &HandlerEnv) -> Outcome {
        // A resumed job carries `approval_decision` in its input (spec §4.8):
        // the resume entry point merges it in before re-enqueuing this node.
        if let Some(Value::String(decision)) = ctx.get("approval_decision") {
            let mut produced = FxHashMap::default();
            produced.insert("approval_decision".to_string(), json!(decision));
            if let Some(message) = ctx.get("approval_message") {
                produced.insert("approval_message".to_string(), message.clone());
            }
            let handle = if decision == "yes" { "yes" } else { "no" };
            return Outcome::Continue {
                produced,
                next: NextNodes::Handle(handle),
                tool_calls: None,
            };
        }

        let Some(message_tpl) = node.config_str("message") else {
            return Outcome::Fail {
                error: "user_approval node missing message config".into(),
            };
        };
        let message = template::resolve(message_tpl, &ctx.to_value());
        Outcome::Suspend { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EchoProvider, NoopToolExecutor};
    use crate::model::NodeConfig;
    use crate::types::NodeType;
    use serde_json::json;
    use std::sync::Arc;

    fn env() -> HandlerEnv {
        HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor))
    }

    #[tokio::test]
    async fn first_entry_suspends_with_resolved_message() {
        let mut config = NodeConfig::new();
        config.insert("message".into(), json!("Proceed, {{input.name}}?"));
        let node = Node::new("gate", NodeType::UserApproval).with_config(config);
        let ctx = Context::from_value(json!({"name": "Ada"}));

        match UserApprovalHandler.run(&node, &ctx, &env()).await {
            Outcome::Suspend { message } => assert_eq!(message, "Proceed, Ada?"),
            _ => panic!("expected Suspend"),
        }
    }

    #[tokio::test]
    async fn resumed_entry_routes_on_decision() {
        let node = Node::new("gate", NodeType::UserApproval);
        let ctx = Context::from_value(json!({"approval_decision": "yes"}));

        match UserApprovalHandler.run(&node, &ctx, &env()).await {
            Outcome::Continue { produced, next, .. } => {
                assert_eq!(produced["approval_decision"], json!("yes"));
                assert_eq!(next, NextNodes::Handle("yes"));
            }
            _ => panic!("expected Continue"),
        }
    }
}

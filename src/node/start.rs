//! The `start` handler (spec §4.4.1): passes the run's initial input through unchanged.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::model::Node;

use super::{Handler, HandlerEnv, NextNodes, Outcome};

#[derive(Clone, Copy, Debug, Default)]
pub struct StartHandler;

#[async_trait]
impl Handler for StartHandler {
    async fn run(&self, _node: &Node, _ctx: &Context, _env: &HandlerEnv) -> Outcome {
        Outcome::Continue {
            produced: FxHashMap::default(),
            next: NextNodes::All,
            tool_calls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{EchoProvider, NoopToolExecutor};
    use crate::types::NodeType;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn start_passes_input_through_unchanged() {
        let ctx = Context::from_value(json!({"name": "Ada"}));
        let env = HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor));
        let node = Node::new("start", NodeType::Start);

        match StartHandler.run(&node, &ctx, &env).await {
            Outcome::Continue { produced, next, tool_calls } => {
                assert!(produced.is_empty());
                assert_eq!(next, NextNodes::All);
                assert!(tool_calls.is_none());
            }
            _ => panic!("expected Continue"),
        }
    }
}

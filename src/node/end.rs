//! The `end` handler (spec §4.4.2): signals run completion.

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::model::Node;

use super::{Handler, HandlerEnv, NextNodes, Outcome};

#[derive(Clone, Copy, Debug, Default)]
pub struct EndHandler;

#[async_trait]
impl Handler for EndHandler {
    async fn run(&self, _node: &Node, _ctx: &Context, _env: &HandlerEnv) -> Outcome {
        Outcome::Continue {
            produced: FxHashMap::default(),
            next: NextNodes::None,
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
    async fn end_has_no_successors() {
        let ctx = Context::from_value(json!({"name": "Ada"}));
        let env = HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor));
        let node = Node::new("end", NodeType::End);

        match EndHandler.run(&node, &ctx, &env).await {
            Outcome::Continue { next, .. } => assert_eq!(next, NextNodes::None),
            _ => panic!("expected Continue"),
        }
    }
}

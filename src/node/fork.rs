//! The `fork` handler (spec §4.4.6): fans out to every outgoing edge as an
//! independent job. The handler itself does no context mutation; fan-out
//! into separate jobs sharing the same input is the engine loop's job when
//! it enqueues successors for [`NextNodes::All`].

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::model::Node;

use super::{Handler, HandlerEnv, NextNodes, Outcome};

#[derive(Clone, Copy, Debug, Default)]
pub struct ForkHandler;

#[async_trait]
impl Handler for ForkHandler {
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
    async fn fork_passes_through_and_targets_every_edge() {
        let ctx = Context::from_value(json!({"q": "?"}));
        let env = HandlerEnv::new(Arc::new(EchoProvider), Arc::new(NoopToolExecutor));
        let node = Node::new("fork", NodeType::Fork);

        match ForkHandler.run(&node, &ctx, &env).await {
            Outcome::Continue { produced, next, .. } => {
                assert!(produced.is_empty());
                assert_eq!(next, NextNodes::All);
            }
            _ => panic!("expected Continue"),
        }
    }
}

//! The `if_else` handler (spec §4.4.4): binary branch on a resolved comparison.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use crate::context::Context;
use crate::model::Node;
use crate::template::{self, Comparable};

use super::{Handler, HandlerEnv, NextNodes, Outcome};

#[derive(Clone, Copy, Debug, Default)]
pub struct IfElseHandler;

#[async_trait]
impl Handler for IfElseHandler {
    async fn run(&self, node: &Node, ctx: &Context, _env: &HandlerEnv) -> Outcome {
        let input = ctx.to_value();

        let (Some(lhs_tpl), Some(operator), Some(rhs_tpl)) =
            (node.config_str("lhs"), node.config_str("condition"), node.config_str("rhs"))
        else {
            return Outcome::Fail {
                error: "if_else node missing lhs/condition/rhs config".into(),
            };
        };

        let lhs_resolved = template::resolve(lhs_tpl, &input);
        let rhs_resolved = template::resolve(rhs_tpl, &input);
        let condition = template::compare(&lhs_resolved, operator, &rhs_resolved);

        let mut produced = FxHashMap::default();
        produced.insert("condition".to_string(), json!(condition));
        produced.insert("lhs_value".to_string(), comparable_value(&lhs_resolved));
        produced.insert("rhs_value".to_string(), comparable_value(&rhs_resolved));
        produced.insert("operator".to_string(), json!(operator));

        let handle = if condition { "true" } else { "false" };
        Outcome::Continue {
            produced,
            next: NextNodes::Handle(handle),
            tool_calls: None,
        }
    }
}

/// Numeric literals are stored as JSON numbers, not their resolved string
/// form, so ledger/event consumers see `21` rather than `"21"` (scenario S2).
fn comparable_value(resolved: &str) -> Value {
    match Comparable::parse(resolved) {
        Comparable::Number(n) => json!(n),
        Comparable::Text(s) => json!(s),
    }
}

//! `{{input.PATH}}` template resolution (spec §4.2).
//!
//! Grounded on the teacher's `utils::json_ext::get_by_path` dot-path
//! traversal, adapted to the engine's totality rule: a missing path is never
//! an error, it resolves to the literal substring `undefined`.

use serde_json::Value;

const PREFIX: &str = "{{input.";
const SUFFIX: &str = "}}";

/// Resolve every `{{input.PATH}}` occurrence in `template` against `input`.
///
/// Each path is a dot-separated sequence of object keys or numeric array
/// indices. Resolution always terminates and always produces a string
/// (spec §8 property 4): unresolved paths substitute the literal `undefined`.
#[must_use]
pub fn resolve(template: &str, input: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(PREFIX) {
        out.push_str(&rest[..start]);
        let after_prefix = &rest[start + PREFIX.len()..];
        match after_prefix.find(SUFFIX) {
            Some(end) => {
                let path = &after_prefix[..end];
                out.push_str(&stringify(get_by_path(input, path)));
                rest = &after_prefix[end + SUFFIX.len()..];
            }
            None => {
                // Unterminated template tag: copy the rest verbatim and stop.
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) => "undefined".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Traverse a dot-separated path through nested objects/arrays.
///
/// `"a.b.0.c"` looks up key `a`, then `b`, then index `0`, then key `c`.
/// Returns `None` as soon as a segment cannot be resolved.
#[must_use]
pub fn get_by_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(arr) => segment.parse::<usize>().ok().and_then(|idx| arr.get(idx)),
        _ => None,
    })
}

/// A value parsed as either a numeric literal or left as a raw string, for
/// the if_else comparison rule in spec §4.2: numeric comparison when both
/// sides parse as numbers, string comparison otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparable {
    Number(f64),
    Text(String),
}

impl Comparable {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().parse::<f64>() {
            Ok(n) if s.trim() != "undefined" => Comparable::Number(n),
            _ => Comparable::Text(s.to_string()),
        }
    }
}

/// Compare two resolved template strings per the if_else numeric/string rule.
#[must_use]
pub fn compare(lhs: &str, operator: &str, rhs: &str) -> bool {
    let (l, r) = (Comparable::parse(lhs), Comparable::parse(rhs));
    match (l, r) {
        (Comparable::Number(a), Comparable::Number(b)) => compare_ord(a.partial_cmp(&b), operator),
        _ => compare_ord(Some(lhs.cmp(rhs)), operator),
    }
}

fn compare_ord(ord: Option<std::cmp::Ordering>, operator: &str) -> bool {
    use std::cmp::Ordering::*;
    let Some(ord) = ord else { return false };
    match operator {
        ">" => ord == Greater,
        "<" => ord == Less,
        "=" => ord == Equal,
        ">=" => ord == Greater || ord == Equal,
        "<=" => ord == Less || ord == Equal,
        "!=" => ord != Equal,
        _ => false,
    }
}

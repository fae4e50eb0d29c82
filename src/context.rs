//! The accumulated context object that flows along workflow edges (spec §3, §4.3).
//!
//! Grounded on the teacher's `reducers::map_merge::MapMerge` reducer and
//! `app::apply_barrier`'s merge-then-apply pattern, collapsed here to a
//! single flat channel: the engine has no messages/errors/extra split, only
//! one accumulated JSON object per run of the universal output rule.

use rustc_hash::FxHashMap;
use serde_json::Value;

/// The in-flight accumulated object that flows along edges.
///
/// Not a persisted entity in its own right (spec §3): it is always
/// reconstructable from the predecessor's ledger `output`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
    fields: FxHashMap<String, Value>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a `Context` from a run's `initial_input` JSON object.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut fields = FxHashMap::default();
        if let Value::Object(map) = value {
            for (k, v) in map {
                fields.insert(k, v);
            }
        }
        Self { fields }
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Apply the universal output accumulation rule (spec §4.3): shallow,
    /// right-biased merge of `produced` on top of this context. Last writer
    /// wins per key; nested objects are replaced wholesale, never deep-merged
    /// (spec §9: deep merge would silently coalesce unrelated fields).
    pub fn merge(&mut self, produced: FxHashMap<String, Value>) {
        for (key, value) in produced {
            self.fields.insert(key, value);
        }
    }

    /// Produce a new `Context` that is `self` merged with `produced`, leaving
    /// `self` untouched. Used by handlers that need the merged view without
    /// mutating the ledger's recorded `input`.
    #[must_use]
    pub fn merged(&self, produced: FxHashMap<String, Value>) -> Context {
        let mut next = self.clone();
        next.merge(produced);
        next
    }

    /// Does `self` contain every key/value pair present in `other`? Used by
    /// the output-accumulation property test (spec §8 property 1).
    #[must_use]
    pub fn contains_all(&self, other: &Context) -> bool {
        other.fields.iter().all(|(k, v)| self.fields.get(k) == Some(v))
    }
}

impl From<Value> for Context {
    fn from(value: Value) -> Self {
        Context::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_shallow_and_right_biased() {
        let mut ctx = Context::from_value(json!({"a": 1, "nested": {"x": 1}}));
        let mut produced = FxHashMap::default();
        produced.insert("a".to_string(), json!(2));
        produced.insert("nested".to_string(), json!({"y": 2}));
        ctx.merge(produced);
        assert_eq!(ctx.get("a"), Some(&json!(2)));
        // Nested object replaced wholesale, not deep-merged.
        assert_eq!(ctx.get("nested"), Some(&json!({"y": 2})));
    }

    #[test]
    fn downstream_context_contains_upstream_output() {
        let upstream = Context::from_value(json!({"name": "Ada"}));
        let mut produced = FxHashMap::default();
        produced.insert("message".to_string(), json!("hi"));
        let downstream = upstream.merged(produced);
        assert!(downstream.contains_all(&upstream));
    }
}

//! Trait merging.
//!
//! Traits are reusable fragments declared in a node's `traits` list. They are
//! folded into the node as defaults:
//!
//! 1. Traits are applied in declaration order; a later trait overwrites keys
//!    set by an earlier one.
//! 2. Keys the node declares itself always win over any trait.
//! 3. The original `traits` list is kept on the result.
//!
//! The merge is shallow: only top-level keys are considered.

use serde_json::{Map, Value};

use crate::types::TRAITS_KEY;

/// Fold `traits` into `target`.
///
/// Never fails and never mutates its inputs. A non-object `target` is
/// returned unchanged; non-object trait entries contribute nothing.
pub fn merge(target: &Value, traits: &[Value]) -> Value {
    let Value::Object(own) = target else {
        return target.clone();
    };

    let mut merged = Map::new();
    for fragment in traits {
        if let Value::Object(fragment) = fragment {
            for (key, value) in fragment {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    for (key, value) in own {
        if key != TRAITS_KEY {
            merged.insert(key.clone(), value.clone());
        }
    }

    if let Some(original) = own.get(TRAITS_KEY) {
        merged.insert(TRAITS_KEY.to_string(), original.clone());
    }

    Value::Object(merged)
}

/// Merge the node's own `traits` list, taken as-is.
///
/// Trait entries that are still `$ref` wrappers are merged literally; callers
/// that need them resolved go through the builder.
pub fn apply_traits(target: &Value) -> Value {
    match target.get(TRAITS_KEY).and_then(Value::as_array) {
        Some(traits) => merge(target, traits),
        None => target.clone(),
    }
}

/// Remove the `traits` key from an object, leaving other values untouched.
pub fn strip_traits(node: &mut Value) {
    if let Value::Object(map) = node {
        map.remove(TRAITS_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn traits_of(node: &Value) -> Vec<Value> {
        node[TRAITS_KEY].as_array().cloned().unwrap_or_default()
    }

    #[test]
    fn later_trait_wins_over_earlier() {
        let target = json!({
            "action": "send",
            "traits": [
                { "description": "some description" },
                { "description": "another description" }
            ]
        });
        let merged = merge(&target, &traits_of(&target));
        assert_eq!(merged["description"], "another description");
        assert_eq!(merged["action"], "send");
    }

    #[test]
    fn own_key_wins_over_every_trait() {
        let target = json!({
            "description": "root description",
            "traits": [
                { "description": "some description" },
                { "description": "another description" }
            ]
        });
        let merged = merge(&target, &traits_of(&target));
        assert_eq!(merged["description"], "root description");
    }

    #[test]
    fn untouched_trait_keys_survive() {
        let target = json!({
            "traits": [
                { "summary": "s1", "description": "d1" },
                { "description": "d2" }
            ]
        });
        let mut merged = merge(&target, &traits_of(&target));
        strip_traits(&mut merged);
        assert_eq!(merged, json!({ "summary": "s1", "description": "d2" }));
    }

    #[test]
    fn original_trait_list_is_kept() {
        let target = json!({
            "traits": [ { "summary": "s" } ]
        });
        let merged = merge(&target, &traits_of(&target));
        assert_eq!(merged[TRAITS_KEY], target[TRAITS_KEY]);
    }

    #[test]
    fn empty_trait_list_is_identity() {
        let target = json!({ "summary": "s", "traits": [] });
        assert_eq!(merge(&target, &[]), target);

        let bare = json!({ "summary": "s" });
        assert_eq!(merge(&bare, &[]), bare);
    }

    #[test]
    fn merge_is_shallow() {
        let target = json!({
            "bindings": { "kafka": { "key": "own" } },
            "traits": [ { "bindings": { "amqp": { "ack": true } } } ]
        });
        let merged = merge(&target, &traits_of(&target));
        assert_eq!(merged["bindings"], json!({ "kafka": { "key": "own" } }));
    }

    #[test]
    fn merge_does_not_mutate_inputs() {
        let target = json!({ "a": 1, "traits": [ { "b": 2 } ] });
        let traits = traits_of(&target);
        let before = (target.clone(), traits.clone());

        let first = merge(&target, &traits);
        let second = merge(&target, &traits);

        assert_eq!(first, second);
        assert_eq!((target, traits), before);
    }

    #[test]
    fn own_keys_take_trait_position_order() {
        let target = json!({ "b": "own", "traits": [ { "a": 1, "b": 2 } ] });
        let merged = merge(&target, &traits_of(&target));
        let keys: Vec<_> = merged.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "traits"]);
    }

    #[test]
    fn non_object_inputs() {
        assert_eq!(merge(&json!("scalar"), &[json!({ "a": 1 })]), json!("scalar"));
        let merged = merge(&json!({ "x": 1 }), &[json!(42), json!({ "y": 2 })]);
        assert_eq!(merged, json!({ "y": 2, "x": 1 }));
    }

    #[test]
    fn apply_traits_uses_own_list() {
        let target = json!({ "traits": [ { "summary": "s" } ] });
        assert_eq!(apply_traits(&target)["summary"], "s");
        assert_eq!(apply_traits(&json!({ "a": 1 })), json!({ "a": 1 }));
    }
}

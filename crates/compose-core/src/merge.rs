//! Configuration merge strategies.
//!
//! An extension's effective configuration is its default configuration with
//! every accumulated override folded on top, in insertion order. The fold
//! step is [`shallow_merge`] unless the extension supplies its own function;
//! [`deep_merge`] is provided for extensions that want nested objects merged.

use serde_json::Value;

/// Merge `override_value` into `base` one level deep.
///
/// If both values are objects, each top-level key of the override replaces
/// the key in the base; nested objects and arrays are replaced wholesale.
/// Otherwise the override replaces the base entirely.
pub fn shallow_merge(base: Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(mut base_map), Value::Object(other_map)) => {
            for (key, other_val) in other_map {
                base_map.insert(key.clone(), other_val.clone());
            }
            Value::Object(base_map)
        }
        (_, other) => other.clone(),
    }
}

/// Merge `override_value` into `base` recursively.
///
/// If both values are objects, merge them key by key with the override
/// taking precedence. Otherwise the override replaces the base.
pub fn deep_merge(mut base: Value, override_value: &Value) -> Value {
    deep_merge_in_place(&mut base, override_value);
    base
}

pub(crate) fn deep_merge_in_place(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Object(base_map), Value::Object(other_map)) => {
            for (key, other_val) in other_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge_in_place(base_val, other_val);
                } else {
                    base_map.insert(key.clone(), other_val.clone());
                }
            }
        }
        (base, other) => {
            *base = other.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_shallow_merge_replaces_top_level_keys() {
        let merged = shallow_merge(json!({"x": 1, "y": 2}), &json!({"x": 5}));
        assert_eq!(merged, json!({"x": 5, "y": 2}));
    }

    #[test]
    fn test_shallow_merge_replaces_nested_objects() {
        let merged = shallow_merge(
            json!({"nested": {"a": 1, "b": 2}, "list": [1, 2]}),
            &json!({"nested": {"a": 9}, "list": [3]}),
        );
        assert_eq!(merged, json!({"nested": {"a": 9}, "list": [3]}));
    }

    #[test]
    fn test_shallow_merge_non_object_override_wins() {
        assert_eq!(shallow_merge(json!({"x": 1}), &json!(true)), json!(true));
        assert_eq!(shallow_merge(json!(null), &json!({"x": 1})), json!({"x": 1}));
    }

    #[test]
    fn test_deep_merge_preserves_sibling_keys() {
        let merged = deep_merge(
            json!({"nested": {"a": 1, "b": 2}, "top": "keep"}),
            &json!({"nested": {"a": 9, "c": 3}}),
        );
        assert_eq!(
            merged,
            json!({"nested": {"a": 9, "b": 2, "c": 3}, "top": "keep"})
        );
    }

    #[test]
    fn test_deep_merge_arrays_are_replaced() {
        let merged = deep_merge(json!({"list": [1, 2]}), &json!({"list": [3]}));
        assert_eq!(merged, json!({"list": [3]}));
    }
}

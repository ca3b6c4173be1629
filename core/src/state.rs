//! The application state tree
//!
//! The store keeps one JSON object keyed by feature key. Each slice is owned by
//! whoever registered it; the store only guarantees key uniqueness.

use serde_json::{Map, Value};

/// Mapping from feature key to that feature's opaque state
pub type AppState = Map<String, Value>;

/// Merge `patch` onto `state` one level deep
///
/// - object onto object: keys of `patch` overwrite keys of `state`
/// - object onto `Null`: the patch becomes the state
/// - anything else: the patch replaces the state
#[must_use]
pub fn shallow_merge(state: Value, patch: &Value) -> Value {
    match (state, patch) {
        (Value::Object(mut current), Value::Object(changes)) => {
            for (key, value) in changes {
                current.insert(key.clone(), value.clone());
            }
            Value::Object(current)
        },
        (_, patch) => patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_top_level_keys_only() {
        let state = json!({"name": "Bruce", "address": {"city": "A", "zip": "1"}});
        let merged = shallow_merge(state, &json!({"address": {"city": "B"}}));
        assert_eq!(merged, json!({"name": "Bruce", "address": {"city": "B"}}));
    }

    #[test]
    fn patch_on_missing_slice_becomes_state() {
        assert_eq!(shallow_merge(Value::Null, &json!({"a": 1})), json!({"a": 1}));
    }

    #[test]
    fn non_object_patch_replaces() {
        assert_eq!(shallow_merge(json!({"a": 1}), &json!(3)), json!(3));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn object() -> impl Strategy<Value = Value> {
            prop::collection::btree_map("[a-e]", any::<i64>(), 0..5)
                .prop_map(|entries| entries.into_iter().map(|(key, value)| (key, json!(value))).collect::<Value>())
        }

        proptest! {
            #[test]
            fn merging_twice_equals_merging_once(state in object(), patch in object()) {
                let once = shallow_merge(state, &patch);
                prop_assert_eq!(shallow_merge(once.clone(), &patch), once);
            }

            #[test]
            fn patch_keys_win(state in object(), patch in object()) {
                let merged = shallow_merge(state.clone(), &patch);
                let merged = merged.as_object().cloned().unwrap_or_default();

                for (key, value) in patch.as_object().into_iter().flatten() {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
                for (key, value) in state.as_object().into_iter().flatten() {
                    if !patch.as_object().is_some_and(|patch| patch.contains_key(key)) {
                        prop_assert_eq!(merged.get(key), Some(value));
                    }
                }
            }
        }
    }
}

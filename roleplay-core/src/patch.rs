//! Partial updates to the world document.
//!
//! A patch mirrors the shape of the world but carries only the keys that
//! change. Objects merge key by key; anything else (strings, numbers,
//! lists) replaces the old value wholesale. A list in a patch is always the
//! complete new list, never items to append.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A partial override tree for [`WorldState`](crate::world::WorldState).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Value);

impl Patch {
    /// The patch that changes nothing.
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Wrap a JSON tree. Only objects are patches; `null` counts as empty.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(_) => Some(Self(value)),
            Value::Null => Some(Self::empty()),
            _ => None,
        }
    }

    /// True if applying this patch cannot change anything.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Deep-merge `patch` onto `base`, returning the merged tree.
///
/// Neither input is modified. When both sides hold an object under the same
/// key the merge recurses; otherwise the patch value wins.
pub fn merge(patch: &Value, base: &Value) -> Value {
    match (patch, base) {
        (Value::Object(patch_map), Value::Object(base_map)) => {
            let mut merged = base_map.clone();
            for (key, patch_value) in patch_map {
                let next = match merged.get(key) {
                    Some(base_value @ Value::Object(_)) if patch_value.is_object() => {
                        merge(patch_value, base_value)
                    }
                    _ => patch_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        // A null patch means "no changes", the same as an empty object.
        (Value::Null, _) => base.clone(),
        _ => patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Value {
        json!({
            "a": {"b": 1, "c": [1, 2], "d": {"e": "x"}},
            "f": "keep",
            "g": [10, 20]
        })
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let base = base();
        assert_eq!(merge(&json!({}), &base), base);
        assert_eq!(merge(Patch::empty().as_value(), &base), base);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = base();
        let patch = json!({"a": {"b": 2, "c": [3], "d": {"z": true}}, "g": []});

        let once = merge(&patch, &base);
        let twice = merge(&patch, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nested_change_leaves_siblings_untouched() {
        let base = base();
        let merged = merge(&json!({"a": {"b": 99}}), &base);

        assert_eq!(merged["a"]["b"], 99);
        assert_eq!(merged["a"]["c"], json!([1, 2]));
        assert_eq!(merged["a"]["d"], json!({"e": "x"}));
        assert_eq!(merged["f"], "keep");
        assert_eq!(merged["g"], json!([10, 20]));
    }

    #[test]
    fn test_lists_replace_instead_of_append() {
        let merged = merge(&json!({"g": [30]}), &base());
        assert_eq!(merged["g"], json!([30]));

        let cleared = merge(&json!({"a": {"c": []}}), &base());
        assert_eq!(cleared["a"]["c"], json!([]));
    }

    #[test]
    fn test_object_replaces_scalar_and_vice_versa() {
        let merged = merge(&json!({"f": {"now": "object"}, "a": "flat"}), &base());
        assert_eq!(merged["f"], json!({"now": "object"}));
        assert_eq!(merged["a"], "flat");
    }

    #[test]
    fn test_new_keys_are_added() {
        let merged = merge(&json!({"a": {"new": 1}, "h": "added"}), &base());
        assert_eq!(merged["a"]["new"], 1);
        assert_eq!(merged["a"]["b"], 1);
        assert_eq!(merged["h"], "added");
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let base = base();
        let patch = json!({"a": {"b": 5}});
        let base_before = base.clone();
        let patch_before = patch.clone();

        let _ = merge(&patch, &base);

        assert_eq!(base, base_before);
        assert_eq!(patch, patch_before);
    }

    #[test]
    fn test_patch_from_value() {
        assert!(Patch::from_value(json!({"a": 1})).is_some());
        assert!(Patch::from_value(Value::Null).map(|p| p.is_empty()).unwrap_or(false));
        assert!(Patch::from_value(json!([1, 2])).is_none());
        assert!(Patch::from_value(json!("text")).is_none());
    }
}

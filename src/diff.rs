//! Structural comparison of list documents.
//!
//! Arrays compare by position; objects compare by key set regardless of
//! key order. Numbers compare by value, so `1` and `1.0` are equal.

use serde_json::Value;

use crate::model::{Document, Overlay};

/// Deep structural equality.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, x)| y.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => false,
    }
}

/// Overlay keys whose merged value differs from the base.
///
/// A key staged back to its original value is not a change.
pub fn changed_keys<'a>(overlay: &'a Overlay, old: &Document, new: &Document) -> Vec<&'a str> {
    overlay
        .keys()
        .filter(|key| match (old.get(*key), new.get(*key)) {
            (Some(old), Some(new)) => !deep_equal(old, new),
            (None, None) => false,
            _ => true,
        })
        .collect()
}

/// How one element changed between two `elements` arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementChange {
    Added(String),
    Removed(String),
    Modified(String),
    Moved(String),
}

/// Element-level summary of two `elements` arrays, matched by `id` or
/// legacy `name`. Unkeyed elements are compared by position.
pub fn element_changes(old: &[Value], new: &[Value]) -> Vec<ElementChange> {
    let key = |v: &Value, i: usize| {
        v.get("id")
            .or_else(|| v.get("name"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("#{i}"), str::to_string)
    };
    let old_keys: Vec<String> = old.iter().enumerate().map(|(i, v)| key(v, i)).collect();
    let new_keys: Vec<String> = new.iter().enumerate().map(|(i, v)| key(v, i)).collect();

    let mut changes = Vec::new();
    for (i, (k, value)) in new_keys.iter().zip(new).enumerate() {
        match old_keys.iter().position(|o| o == k) {
            None => changes.push(ElementChange::Added(k.clone())),
            Some(j) if !deep_equal(&old[j], value) => {
                changes.push(ElementChange::Modified(k.clone()));
            }
            Some(j) if j != i => changes.push(ElementChange::Moved(k.clone())),
            Some(_) => {}
        }
    }
    for k in &old_keys {
        if !new_keys.contains(k) {
            changes.push(ElementChange::Removed(k.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn object(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn object_key_order_does_not_matter() {
        assert!(deep_equal(&json!({"a": 1, "b": [1, 2]}), &json!({"b": [1, 2], "a": 1})));
    }

    #[test]
    fn array_order_matters() {
        assert!(!deep_equal(&json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn missing_and_extra_keys_differ() {
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": null})));
        assert!(!deep_equal(&json!({"a": 1, "c": 2}), &json!({"a": 1, "b": 2})));
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(!deep_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn changed_title_is_reported() {
        let old = object(json!({"title": "A", "elements": [{"id": "1", "name": "x", "tags": ["t1"]}]}));
        let overlay = Overlay::from(object(json!({"title": "B"})));
        let new = overlay.apply_to(&old);

        assert_eq!(changed_keys(&overlay, &old, &new), vec!["title"]);
    }

    #[test]
    fn reverted_key_is_not_a_change() {
        let old = object(json!({"title": "A", "elements": [{"id": "1", "name": "x", "tags": ["t1"]}]}));
        let overlay = Overlay::from(object(json!({
            "title": "A",
            "elements": [{"tags": ["t1"], "name": "x", "id": "1"}],
        })));
        let new = overlay.apply_to(&old);

        assert!(changed_keys(&overlay, &old, &new).is_empty());
    }

    #[test]
    fn new_key_is_a_change() {
        let old = object(json!({"title": "A"}));
        let overlay = Overlay::from(object(json!({"thumbnail": "https://x.io/a.png"})));
        let new = overlay.apply_to(&old);

        assert_eq!(changed_keys(&overlay, &old, &new), vec!["thumbnail"]);
    }

    #[test]
    fn summarizes_element_changes() {
        let old = vec![
            json!({"id": "a"}),
            json!({"id": "b", "tags": ["x"]}),
            json!({"id": "c"}),
        ];
        let new = vec![
            json!({"id": "b", "tags": ["y"]}),
            json!({"id": "a"}),
            json!({"id": "d"}),
        ];

        assert_eq!(
            element_changes(&old, &new),
            vec![
                ElementChange::Modified("b".into()),
                ElementChange::Moved("a".into()),
                ElementChange::Added("d".into()),
                ElementChange::Removed("c".into()),
            ]
        );
    }

    #[test]
    fn identical_elements_have_no_changes() {
        let elements = vec![json!({"name": "legacy"}), json!({"description": "unkeyed"})];
        assert!(element_changes(&elements, &elements).is_empty());
    }
}

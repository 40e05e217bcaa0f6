//! Overlay: locally staged, not yet published edits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Document;

/// A sparse patch of top-level list fields.
///
/// Merging is shallow: a key present in the overlay replaces the whole
/// base value for that key. Two edits to `elements` do not combine; the
/// later one wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overlay(Map<String, Value>);

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Stage a single field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Fold another partial on top of this one. Later keys win.
    pub fn merge(&mut self, partial: Overlay) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }

    /// The base document with every overlay key replacing its base value.
    pub fn apply_to(&self, base: &Document) -> Document {
        let mut merged = base.clone();
        for (key, value) in &self.0 {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl From<Document> for Overlay {
    fn from(fields: Document) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn overlay_keys_replace_base_keys() {
        let base = object(json!({
            "title": "A",
            "elements": [{"id": "1", "name": "x", "tags": ["t1"]}],
        }));
        let overlay = Overlay::from(object(json!({"title": "B"})));

        let merged = overlay.apply_to(&base);
        assert_eq!(
            Value::Object(merged),
            json!({"title": "B", "elements": [{"id": "1", "name": "x", "tags": ["t1"]}]})
        );
    }

    #[test]
    fn merge_is_shallow() {
        let mut overlay = Overlay::from(object(json!({
            "elements": [{"id": "1"}, {"id": "2"}],
            "title": "B",
        })));
        overlay.merge(Overlay::from(object(json!({"elements": [{"id": "3"}]}))));

        assert_eq!(
            overlay,
            Overlay::from(object(json!({"elements": [{"id": "3"}], "title": "B"})))
        );
        assert_eq!(overlay.len(), 2);
    }

    #[test]
    fn empty_overlay_leaves_base_untouched() {
        let base = object(json!({"title": "A", "author": "me"}));
        assert_eq!(Overlay::new().apply_to(&base), base);
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut overlay = Overlay::new();
        overlay.set("title", json!("B"));
        assert_eq!(serde_json::to_value(&overlay).unwrap(), json!({"title": "B"}));
    }
}

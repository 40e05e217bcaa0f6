//! Example documents derived from a schema, as a starting point for
//! migrating a list by hand.

use serde_json::{Map, Value, json};

const PLACEHOLDER: &str = "string";
const PLACEHOLDER_URL: &str = "https://example.com";

/// Build a minimal document shaped like `schema`.
///
/// Picks `const`, then the first `enum` option, then the first `anyOf` or
/// `oneOf` branch, then a default for the declared type. Objects get one
/// key per declared property with required keys first; arrays get a single
/// example item.
pub fn example(schema: &Value) -> Value {
    let Value::Object(schema) = schema else {
        return Value::Null;
    };

    if let Some(constant) = schema.get("const") {
        return constant.clone();
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|options| options.first())
    {
        return first.clone();
    }
    for combinator in ["anyOf", "oneOf"] {
        if let Some(first) = schema
            .get(combinator)
            .and_then(Value::as_array)
            .and_then(|branches| branches.first())
        {
            return example(first);
        }
    }

    match declared_type(schema) {
        Some("object") => object(schema),
        Some("array") => match schema.get("items") {
            Some(items) if !items.is_array() => Value::Array(vec![example(items)]),
            _ => Value::Array(Vec::new()),
        },
        Some("string") => match schema.get("format").and_then(Value::as_str) {
            Some("uri" | "url") => json!(PLACEHOLDER_URL),
            _ => json!(PLACEHOLDER),
        },
        Some("integer" | "number") => json!(0),
        Some("boolean") => json!(false),
        _ => Value::Null,
    }
}

/// The type to build for. A type list prefers its first non-null entry;
/// an untyped schema is inferred from `properties` or `items`.
fn declared_type(schema: &Map<String, Value>) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(name)) => Some(name.as_str()),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            names
                .iter()
                .find(|n| **n != "null")
                .or_else(|| names.first())
                .copied()
        }
        _ if schema.contains_key("properties") => Some("object"),
        _ if schema.contains_key("items") => Some("array"),
        _ => None,
    }
}

fn object(schema: &Map<String, Value>) -> Value {
    let empty = Map::new();
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut out = Map::new();
    for name in &required {
        let value = properties.get(*name).map_or(Value::Null, example);
        out.insert((*name).to_string(), value);
    }
    for (name, property) in properties {
        if !out.contains_key(name) {
            out.insert(name.clone(), example(property));
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_keys_come_first() {
        let schema = json!({
            "type": "object",
            "required": ["title", "elements"],
            "properties": {
                "description": {"type": "string"},
                "elements": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id"],
                        "properties": {
                            "tags": {"type": "array", "items": {"type": "string"}},
                            "id": {"type": "string"},
                            "link": {"type": "string", "format": "uri"}
                        }
                    }
                },
                "title": {"type": "string"}
            }
        });

        let doc = example(&schema);
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["title", "elements", "description"]);

        assert_eq!(
            doc["elements"],
            json!([{"id": "string", "tags": ["string"], "link": "https://example.com"}])
        );
        let item_keys: Vec<&String> = doc["elements"][0].as_object().unwrap().keys().collect();
        assert_eq!(item_keys, ["id", "tags", "link"]);
    }

    #[test]
    fn enum_then_combinators_then_type() {
        assert_eq!(example(&json!({"type": "string", "enum": ["a", "b"]})), json!("a"));
        assert_eq!(example(&json!({"const": 3})), json!(3));
        assert_eq!(
            example(&json!({"anyOf": [{"type": "boolean"}, {"type": "string"}]})),
            json!(false)
        );
        assert_eq!(example(&json!({"oneOf": [{"type": "integer"}]})), json!(0));
        assert_eq!(example(&json!({"type": ["null", "number"]})), json!(0));
        assert_eq!(example(&json!({"type": "integer", "minimum": 1})), json!(0));
    }

    #[test]
    fn untyped_schemas() {
        assert_eq!(example(&json!(true)), Value::Null);
        assert_eq!(example(&json!({})), Value::Null);
        assert_eq!(
            example(&json!({"properties": {"ok": {"type": "boolean"}}})),
            json!({"ok": false})
        );
        assert_eq!(example(&json!({"type": "array"})), json!([]));
    }
}

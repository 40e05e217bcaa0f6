//! JSON Schema support for release compatibility checks.
//!
//! Only the subset release schemas actually use is understood. Compiling a
//! schema that uses anything else fails with [`SchemaError::Unsupported`]
//! rather than validating half of it.

mod example;

pub use example::example;

use std::fmt;

use regex::Regex;
use serde_json::{Map, Value};

use crate::diff::deep_equal;
use crate::model::is_url;

/// Keywords that carry no validation meaning.
const ANNOTATIONS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "title",
    "description",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
    "$defs",
    "definitions",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("unsupported keyword '{keyword}' at {path}")]
    Unsupported { path: String, keyword: String },

    #[error("invalid schema at {path}: {message}")]
    Invalid { path: String, message: String },
}

/// One validation failure, displayed as `<dotted.path>: <message>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "string" => Self::String,
            "array" => Self::Array,
            "object" => Self::Object,
            _ => return None,
        })
    }

    fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        let actual = Self::of(value);
        actual == self
            || (self == Self::Number && actual == Self::Integer)
            || (self == Self::Integer
                && value.as_f64().is_some_and(|f| f.fract() == 0.0))
    }

    fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

#[derive(Debug, Default)]
enum Additional {
    #[default]
    Allow,
    Deny,
    Schema(Box<Node>),
}

/// A compiled schema node.
#[derive(Debug, Default)]
struct Node {
    never: bool,
    types: Vec<JsonType>,
    enumeration: Option<Vec<Value>>,
    constant: Option<Value>,
    properties: Vec<(String, Node)>,
    required: Vec<String>,
    additional: Additional,
    items: Option<Box<Node>>,
    any_of: Vec<Node>,
    one_of: Vec<Node>,
    min_length: Option<u64>,
    max_length: Option<u64>,
    pattern: Option<Regex>,
    uri: bool,
    minimum: Option<f64>,
    maximum: Option<f64>,
    min_items: Option<u64>,
    max_items: Option<u64>,
    unique_items: bool,
}

/// A compiled validator for one schema.
#[derive(Debug)]
pub struct Validator {
    root: Node,
}

impl Validator {
    /// Compile a JSON Schema.
    pub fn compile(schema: &Value) -> Result<Self, SchemaError> {
        Ok(Self {
            root: compile(schema, "root")?,
        })
    }

    /// Validate a value. Issues come back in a stable order: object checks
    /// follow the schema's property order, array items follow position.
    pub fn validate(&self, value: &Value) -> Vec<Issue> {
        let mut issues = Vec::new();
        check(&self.root, value, &mut Vec::new(), &mut issues);
        issues
    }
}

fn invalid(path: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::Invalid {
        path: path.to_string(),
        message: message.into(),
    }
}

fn compile(schema: &Value, path: &str) -> Result<Node, SchemaError> {
    let map = match schema {
        Value::Bool(true) => return Ok(Node::default()),
        Value::Bool(false) => {
            return Ok(Node {
                never: true,
                ..Node::default()
            });
        }
        Value::Object(map) => map,
        _ => return Err(invalid(path, "a schema must be an object or a boolean")),
    };

    let mut node = Node::default();
    for (keyword, value) in map {
        let here = format!("{path}.{keyword}");
        match keyword.as_str() {
            "type" => node.types = compile_types(value, &here)?,
            "enum" => {
                let Value::Array(options) = value else {
                    return Err(invalid(&here, "must be an array"));
                };
                node.enumeration = Some(options.clone());
            }
            "const" => node.constant = Some(value.clone()),
            "properties" => {
                let Value::Object(properties) = value else {
                    return Err(invalid(&here, "must be an object"));
                };
                for (name, property) in properties {
                    node.properties
                        .push((name.clone(), compile(property, &format!("{here}.{name}"))?));
                }
            }
            "required" => {
                node.required = string_list(value).ok_or_else(|| invalid(&here, "must be a list of strings"))?;
            }
            "additionalProperties" => {
                node.additional = match value {
                    Value::Bool(true) => Additional::Allow,
                    Value::Bool(false) => Additional::Deny,
                    other => Additional::Schema(Box::new(compile(other, &here)?)),
                };
            }
            "items" => {
                if value.is_array() {
                    return Err(SchemaError::Unsupported {
                        path: here,
                        keyword: "items (tuple form)".into(),
                    });
                }
                node.items = Some(Box::new(compile(value, &here)?));
            }
            "anyOf" | "oneOf" => {
                let Value::Array(branches) = value else {
                    return Err(invalid(&here, "must be an array"));
                };
                let compiled = branches
                    .iter()
                    .enumerate()
                    .map(|(i, b)| compile(b, &format!("{here}.{i}")))
                    .collect::<Result<Vec<_>, _>>()?;
                if keyword == "anyOf" {
                    node.any_of = compiled;
                } else {
                    node.one_of = compiled;
                }
            }
            "minLength" => node.min_length = Some(count(value, &here)?),
            "maxLength" => node.max_length = Some(count(value, &here)?),
            "minItems" => node.min_items = Some(count(value, &here)?),
            "maxItems" => node.max_items = Some(count(value, &here)?),
            "minimum" => node.minimum = Some(number(value, &here)?),
            "maximum" => node.maximum = Some(number(value, &here)?),
            "uniqueItems" => node.unique_items = value.as_bool().unwrap_or(false),
            "pattern" => {
                let source = value.as_str().ok_or_else(|| invalid(&here, "must be a string"))?;
                node.pattern =
                    Some(Regex::new(source).map_err(|e| invalid(&here, e.to_string()))?);
            }
            "format" => node.uri = matches!(value.as_str(), Some("uri" | "url")),
            k if ANNOTATIONS.contains(&k) => {}
            _ => {
                return Err(SchemaError::Unsupported {
                    path: path.to_string(),
                    keyword: keyword.clone(),
                });
            }
        }
    }
    Ok(node)
}

fn compile_types(value: &Value, path: &str) -> Result<Vec<JsonType>, SchemaError> {
    let names = match value {
        Value::String(name) => vec![name.clone()],
        other => string_list(other).ok_or_else(|| invalid(path, "must be a string or list of strings"))?,
    };
    names
        .iter()
        .map(|name| {
            JsonType::parse(name).ok_or_else(|| SchemaError::Unsupported {
                path: path.to_string(),
                keyword: format!("type '{name}'"),
            })
        })
        .collect()
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn count(value: &Value, path: &str) -> Result<u64, SchemaError> {
    value
        .as_u64()
        .ok_or_else(|| invalid(path, "must be a non-negative integer"))
}

fn number(value: &Value, path: &str) -> Result<f64, SchemaError> {
    value.as_f64().ok_or_else(|| invalid(path, "must be a number"))
}

// ── Validation ──

fn dotted(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(".")
    }
}

fn push(issues: &mut Vec<Issue>, path: &[String], message: impl Into<String>) {
    issues.push(Issue {
        path: dotted(path),
        message: message.into(),
    });
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

fn check(node: &Node, value: &Value, path: &mut Vec<String>, issues: &mut Vec<Issue>) {
    if node.never {
        push(issues, path, "Value is not allowed");
        return;
    }

    if !node.types.is_empty() && !node.types.iter().any(|t| t.accepts(value)) {
        let expected: Vec<&str> = node.types.iter().map(|t| t.name()).collect();
        push(
            issues,
            path,
            format!(
                "Expected {}, received {}",
                expected.join(" | "),
                JsonType::of(value).name()
            ),
        );
        return;
    }

    if let Some(constant) = &node.constant
        && !deep_equal(constant, value)
    {
        push(issues, path, format!("Invalid literal value, expected {}", describe(constant)));
    }

    if let Some(options) = &node.enumeration
        && !options.iter().any(|o| deep_equal(o, value))
    {
        let expected: Vec<String> = options.iter().map(describe).collect();
        push(
            issues,
            path,
            format!(
                "Invalid enum value. Expected {}, received {}",
                expected.join(" | "),
                describe(value)
            ),
        );
    }

    if !node.any_of.is_empty() {
        let matched = node
            .any_of
            .iter()
            .any(|branch| branch_issues(branch, value).is_empty());
        if !matched {
            push(issues, path, "Invalid input: does not match any allowed schema");
        }
    }

    if !node.one_of.is_empty() {
        let matched = node
            .one_of
            .iter()
            .filter(|branch| branch_issues(branch, value).is_empty())
            .count();
        match matched {
            0 => push(issues, path, "Invalid input: does not match any allowed schema"),
            1 => {}
            _ => push(issues, path, "Invalid input: matches more than one schema"),
        }
    }

    match value {
        Value::String(text) => check_string(node, text, path, issues),
        Value::Number(_) => check_number(node, value, path, issues),
        Value::Array(items) => check_array(node, items, path, issues),
        Value::Object(map) => check_object(node, map, path, issues),
        Value::Null | Value::Bool(_) => {}
    }
}

fn branch_issues(node: &Node, value: &Value) -> Vec<Issue> {
    let mut issues = Vec::new();
    check(node, value, &mut Vec::new(), &mut issues);
    issues
}

fn check_string(node: &Node, text: &str, path: &[String], issues: &mut Vec<Issue>) {
    let length = text.chars().count() as u64;
    if let Some(min) = node.min_length
        && length < min
    {
        push(issues, path, format!("String must contain at least {min} character(s)"));
    }
    if let Some(max) = node.max_length
        && length > max
    {
        push(issues, path, format!("String must contain at most {max} character(s)"));
    }
    if let Some(pattern) = &node.pattern
        && !pattern.is_match(text)
    {
        push(issues, path, format!("Invalid string: must match pattern {}", pattern.as_str()));
    }
    if node.uri && !is_url(text) {
        push(issues, path, "Invalid url");
    }
}

fn check_number(node: &Node, value: &Value, path: &[String], issues: &mut Vec<Issue>) {
    let Some(n) = value.as_f64() else {
        return;
    };
    if let Some(min) = node.minimum
        && n < min
    {
        push(issues, path, format!("Number must be greater than or equal to {min}"));
    }
    if let Some(max) = node.maximum
        && n > max
    {
        push(issues, path, format!("Number must be less than or equal to {max}"));
    }
}

fn check_array(node: &Node, items: &[Value], path: &mut Vec<String>, issues: &mut Vec<Issue>) {
    let length = items.len() as u64;
    if let Some(min) = node.min_items
        && length < min
    {
        push(issues, path, format!("Array must contain at least {min} element(s)"));
    }
    if let Some(max) = node.max_items
        && length > max
    {
        push(issues, path, format!("Array must contain at most {max} element(s)"));
    }
    if node.unique_items {
        let duplicate = items
            .iter()
            .enumerate()
            .any(|(i, a)| items[..i].iter().any(|b| deep_equal(a, b)));
        if duplicate {
            push(issues, path, "Array items must be unique");
        }
    }
    if let Some(item) = &node.items {
        for (i, value) in items.iter().enumerate() {
            path.push(i.to_string());
            check(item, value, path, issues);
            path.pop();
        }
    }
}

fn check_object(
    node: &Node,
    map: &Map<String, Value>,
    path: &mut Vec<String>,
    issues: &mut Vec<Issue>,
) {
    for name in &node.required {
        if !map.contains_key(name) {
            path.push(name.clone());
            push(issues, path, "Required");
            path.pop();
        }
    }

    for (name, property) in &node.properties {
        if let Some(value) = map.get(name) {
            path.push(name.clone());
            check(property, value, path, issues);
            path.pop();
        }
    }

    let declared = |key: &String| node.properties.iter().any(|(name, _)| name == key);
    match &node.additional {
        Additional::Allow => {}
        Additional::Deny => {
            for key in map.keys().filter(|k| !declared(*k)) {
                push(issues, path, format!("Unrecognized key: '{key}'"));
            }
        }
        Additional::Schema(schema) => {
            for (key, value) in map.iter().filter(|(k, _)| !declared(*k)) {
                path.push(key.clone());
                check(schema, value, path, issues);
                path.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn list_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": ["title", "elements"],
            "properties": {
                "title": {"type": "string", "minLength": 1},
                "links": {
                    "type": "array",
                    "maxItems": 4,
                    "items": {
                        "type": "object",
                        "required": ["url"],
                        "properties": {"url": {"type": "string", "format": "uri"}}
                    }
                },
                "elements": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id"],
                        "additionalProperties": false,
                        "properties": {
                            "id": {"type": "string"},
                            "tags": {"type": "array", "maxItems": 16, "items": {"type": "string"}},
                            "status": {"enum": ["active", "archived"]}
                        }
                    }
                }
            }
        })
    }

    fn messages(issues: &[Issue]) -> Vec<String> {
        issues.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn valid_document_has_no_issues() {
        let validator = Validator::compile(&list_schema()).unwrap();
        let doc = json!({
            "title": "A",
            "links": [{"url": "https://example.com"}],
            "elements": [{"id": "1", "tags": ["t1"], "status": "active"}],
        });
        assert!(validator.validate(&doc).is_empty());
    }

    #[test]
    fn reports_dotted_paths() {
        let validator = Validator::compile(&list_schema()).unwrap();
        let doc = json!({
            "title": "",
            "links": [{"url": "nope"}],
            "elements": [{"tags": ["a", 3], "status": "gone", "extra": true}],
        });

        assert_eq!(
            messages(&validator.validate(&doc)),
            vec![
                "title: String must contain at least 1 character(s)",
                "links.0.url: Invalid url",
                "elements.0.id: Required",
                "elements.0.tags.1: Expected string, received integer",
                "elements.0.status: Invalid enum value. Expected 'active' | 'archived', received 'gone'",
                "elements.0: Unrecognized key: 'extra'",
            ]
        );
    }

    #[test]
    fn root_issues_use_root_path() {
        let validator = Validator::compile(&list_schema()).unwrap();
        assert_eq!(
            messages(&validator.validate(&json!([]))),
            vec!["(root): Expected object, received array"]
        );
    }

    #[test]
    fn validation_is_deterministic() {
        let validator = Validator::compile(&list_schema()).unwrap();
        let elements: Vec<Value> = (0..20).map(|i| json!({"id": i})).collect();
        let doc = json!({"elements": elements});

        let first = validator.validate(&doc);
        assert_eq!(first, validator.validate(&doc));
        assert_eq!(first.len(), 21);
        assert_eq!(first[0].to_string(), "title: Required");
    }

    #[test]
    fn unsupported_keywords_are_reported() {
        let err = Validator::compile(&json!({
            "type": "object",
            "properties": {"a": {"$ref": "#/definitions/a"}}
        }))
        .unwrap_err();
        assert_eq!(
            err,
            SchemaError::Unsupported {
                path: "root.properties.a".into(),
                keyword: "$ref".into(),
            }
        );

        assert!(matches!(
            Validator::compile(&json!({"allOf": []})),
            Err(SchemaError::Unsupported { .. })
        ));
        assert!(matches!(
            Validator::compile(&json!({"type": "decimal"})),
            Err(SchemaError::Unsupported { .. })
        ));
    }

    #[test]
    fn any_of_and_one_of() {
        let validator = Validator::compile(&json!({
            "anyOf": [{"type": "string"}, {"type": "integer"}]
        }))
        .unwrap();
        assert!(validator.validate(&json!(3)).is_empty());
        assert_eq!(validator.validate(&json!(true)).len(), 1);

        let validator = Validator::compile(&json!({
            "oneOf": [{"type": "number"}, {"type": "integer"}]
        }))
        .unwrap();
        assert_eq!(
            messages(&validator.validate(&json!(3))),
            vec!["(root): Invalid input: matches more than one schema"]
        );
        assert!(validator.validate(&json!(3.5)).is_empty());
    }

    #[test]
    fn numeric_and_array_bounds() {
        let validator = Validator::compile(&json!({
            "type": "array",
            "uniqueItems": true,
            "minItems": 1,
            "items": {"type": "integer", "minimum": 0, "maximum": 10}
        }))
        .unwrap();
        assert_eq!(
            messages(&validator.validate(&json!([11, 11]))),
            vec![
                "(root): Array items must be unique",
                "0: Number must be less than or equal to 10",
                "1: Number must be less than or equal to 10",
            ]
        );
        assert_eq!(
            messages(&validator.validate(&json!([]))),
            vec!["(root): Array must contain at least 1 element(s)"]
        );
    }

    #[test]
    fn pattern_and_const() {
        let validator = Validator::compile(&json!({
            "type": "object",
            "properties": {
                "version": {"type": "string", "pattern": "^v\\d+$"},
                "kind": {"const": "list"}
            }
        }))
        .unwrap();
        assert_eq!(
            messages(&validator.validate(&json!({"version": "1", "kind": "map"}))),
            vec![
                "version: Invalid string: must match pattern ^v\\d+$",
                "kind: Invalid literal value, expected 'list'",
            ]
        );
    }

    #[test]
    fn additional_properties_schema() {
        let validator = Validator::compile(&json!({
            "type": "object",
            "additionalProperties": {"type": "boolean"}
        }))
        .unwrap();
        assert_eq!(
            messages(&validator.validate(&json!({"a": true, "b": 1}))),
            vec!["b: Expected boolean, received integer"]
        );
    }

    #[test]
    fn boolean_schemas() {
        assert!(Validator::compile(&json!(true)).unwrap().validate(&json!(1)).is_empty());
        assert_eq!(
            Validator::compile(&json!(false)).unwrap().validate(&json!(1)).len(),
            1
        );
    }
}

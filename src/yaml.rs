//! YAML wire format for list documents.
//!
//! The published file never carries `readme`; it lives in a sibling
//! markdown file and is only part of the in-memory document.

use serde_json::Value;

use crate::model::Document;

/// Field kept out of the YAML file.
pub const README: &str = "readme";

#[derive(Debug, thiserror::Error)]
pub enum YamlError {
    #[error("invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("expected a mapping at the top level, found {0}")]
    NotAMapping(&'static str),
}

/// Parse a YAML document. The top level must be a mapping.
pub fn from_yaml(text: &str) -> Result<Document, YamlError> {
    match serde_yaml::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        Value::Null => Err(YamlError::NotAMapping("an empty document")),
        Value::Array(_) => Err(YamlError::NotAMapping("a sequence")),
        _ => Err(YamlError::NotAMapping("a scalar")),
    }
}

/// Parse any YAML value, used for single field edits.
pub fn value_from_yaml(text: &str) -> Result<Value, YamlError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Serialize a document the way it is published: two-space indent, no
/// anchors, `readme` stripped.
pub fn to_yaml(document: &Document) -> Result<String, YamlError> {
    let (document, _) = split_readme(document.clone());
    Ok(serde_yaml::to_string(&Value::Object(document))?)
}

/// Serialize any value without touching its fields.
pub fn value_to_yaml(value: &Value) -> Result<String, YamlError> {
    Ok(serde_yaml::to_string(value)?)
}

/// Separate the readme from the rest of the document.
pub fn split_readme(mut document: Document) -> (Document, Option<String>) {
    let readme = match document.shift_remove(README) {
        Some(Value::String(text)) => Some(text),
        _ => None,
    };
    (document, readme)
}

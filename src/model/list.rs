//! The awesome list document and its elements.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A list document as it travels between the git host, the overlay, and the CLI.
///
/// Kept untyped so fields the tool doesn't know about survive a round trip.
/// Use [`AwesomeList::from_document`] for a typed view.
pub type Document = Map<String, Value>;

/// Maximum tags on a single element.
pub const MAX_TAGS: usize = 16;

/// Maximum external links on the list itself.
pub const MAX_LINKS: usize = 4;

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/?#]+\.[^\s/?#]+(?:[/?#]\S*)?$|^https?://localhost(?::\d+)?(?:[/?#]\S*)?$")
        .expect("static regex")
});

/// Whether a string looks like an absolute http(s) URL.
pub fn is_url(text: &str) -> bool {
    URL.is_match(text)
}

/// Typed view of a published list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwesomeList {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    /// Markdown stored as a sibling file, not inside the YAML document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,

    #[serde(default)]
    pub elements: Vec<Element>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry in the list.
///
/// Newer documents identify elements by `id`; legacy documents use `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Element {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Freeform markdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// UI clustering label only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element {
    /// The identifying key: `id` when present, otherwise the legacy `name`.
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }

    /// Display label, preferring `name`.
    pub fn label(&self) -> &str {
        self.name.as_deref().or(self.id.as_deref()).unwrap_or("(unnamed)")
    }
}

/// An external link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Link {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub url: String,
}

/// A broken document invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("duplicate element key '{0}'")]
    DuplicateKey(String),

    #[error("element '{element}' has {count} tags (at most {MAX_TAGS})")]
    TooManyTags { element: String, count: usize },

    #[error("list has {0} links (at most {MAX_LINKS})")]
    TooManyLinks(usize),

    #[error("{field} is not a valid URL: {url}")]
    InvalidUrl { field: String, url: String },
}

impl AwesomeList {
    /// Parse a typed view out of a document.
    pub fn from_document(document: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(document.clone()))
    }

    /// Check the document invariants. Returns every violation found, in
    /// document order.
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.links.len() > MAX_LINKS {
            violations.push(Violation::TooManyLinks(self.links.len()));
        }
        for (i, link) in self.links.iter().enumerate() {
            check_url(&format!("links.{i}.url"), &link.url, &mut violations);
        }
        if let Some(thumbnail) = &self.thumbnail {
            check_url("thumbnail", thumbnail, &mut violations);
        }

        let mut seen = HashSet::new();
        for (i, element) in self.elements.iter().enumerate() {
            if let Some(key) = element.key()
                && !seen.insert(key)
            {
                violations.push(Violation::DuplicateKey(key.to_string()));
            }
            if element.tags.len() > MAX_TAGS {
                violations.push(Violation::TooManyTags {
                    element: element.label().to_string(),
                    count: element.tags.len(),
                });
            }
            if let Some(link) = &element.link {
                check_url(&format!("elements.{i}.link"), link, &mut violations);
            }
            for (j, link) in element.links.iter().flatten().enumerate() {
                check_url(&format!("elements.{i}.links.{j}.url"), &link.url, &mut violations);
            }
        }

        violations
    }
}

fn check_url(field: &str, url: &str, violations: &mut Vec<Violation>) {
    if !is_url(url) {
        violations.push(Violation::InvalidUrl {
            field: field.to_string(),
            url: url.to_string(),
        });
    }
}

/// Find an element's position in a raw `elements` array by `id`, falling
/// back to `name`.
pub fn find_element(elements: &[Value], key: &str) -> Option<usize> {
    let matches = |field: &str| {
        elements
            .iter()
            .position(|e| e.get(field).and_then(Value::as_str) == Some(key))
    };
    matches("id").or_else(|| matches("name"))
}

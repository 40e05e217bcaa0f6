//! View preferences: how the element listing is filtered and marked, and
//! which template update the user chose to ignore.

use std::collections::BTreeMap;
use std::{fs, io};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::model::{Element, RepoRef};

use super::{Result, Storage};

const FILE_NAME: &str = "preferences.json";

/// How multiple filter tags combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TagOperator {
    /// Element must carry every tag.
    #[default]
    And,
    /// Element must carry at least one tag.
    Or,
}

/// Tag selection for the element listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub tags: Vec<String>,
    pub operator: TagOperator,
}

impl TagFilter {
    pub fn matches(&self, element: &Element) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let has = |tag: &String| element.tags.contains(tag);
        match self.operator {
            TagOperator::And => self.tags.iter().all(has),
            TagOperator::Or => self.tags.iter().any(has),
        }
    }
}

/// What to do with elements carrying a marked tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    Hide,
    Cross,
    Highlight,
}

/// Persisted per-repository preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    /// Whether edit commands are allowed.
    pub editing: bool,

    pub search: String,

    pub tag_filter: TagFilter,

    /// Tag to marker. Hide wins over cross, cross over highlight.
    pub markers: BTreeMap<String, Marker>,

    /// Template release the user doesn't want to hear about.
    pub dismissed_update: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            editing: true,
            search: String::new(),
            tag_filter: TagFilter::default(),
            markers: BTreeMap::new(),
            dismissed_update: None,
        }
    }
}

impl Preferences {
    /// Whether an element passes the search text and tag filter.
    ///
    /// Search is case-insensitive over name, id, description, and tags.
    pub fn shows(&self, element: &Element) -> bool {
        if self.marker_for(element) == Some(Marker::Hide) {
            return false;
        }
        if !self.tag_filter.matches(element) {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let haystack = [
            element.name.as_deref().unwrap_or_default(),
            element.id.as_deref().unwrap_or_default(),
            element.description.as_str(),
        ];
        haystack
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
            || element
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
    }

    /// The strongest marker that applies to an element.
    pub fn marker_for(&self, element: &Element) -> Option<Marker> {
        let applied: Vec<Marker> = element
            .tags
            .iter()
            .filter_map(|tag| self.markers.get(tag).copied())
            .collect();
        [Marker::Hide, Marker::Cross, Marker::Highlight]
            .into_iter()
            .find(|m| applied.contains(m))
    }

    /// Whether the "update available" notice for `tag` was dismissed.
    pub fn is_dismissed(&self, tag: &str) -> bool {
        self.dismissed_update.as_deref() == Some(tag)
    }
}

impl Storage {
    /// Loads a repository's preferences. Missing file means defaults.
    pub fn load_preferences(&self, repo: &RepoRef) -> Result<Preferences> {
        let path = self.repo_dir(repo)?.join(FILE_NAME);
        match fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Preferences::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Saves a repository's preferences.
    pub fn save_preferences(&self, repo: &RepoRef, preferences: &Preferences) -> Result<()> {
        let path = self.repo_dir(repo)?.join(FILE_NAME);
        fs::write(path, serde_json::to_string_pretty(preferences)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn element(name: &str, tags: &[&str]) -> Element {
        Element {
            name: Some(name.into()),
            description: format!("{name} does things"),
            tags: tags.iter().map(ToString::to_string).collect(),
            ..Element::default()
        }
    }

    #[test]
    fn defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        let prefs = storage.load_preferences(&RepoRef::new("o", "r")).unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.editing);
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).unwrap();
        let repo = RepoRef::new("o", "r");

        let mut prefs = Preferences::default();
        prefs.markers.insert("deprecated".into(), Marker::Cross);
        prefs.dismissed_update = Some("v2.0.0".into());
        storage.save_preferences(&repo, &prefs).unwrap();

        let loaded = storage.load_preferences(&repo).unwrap();
        assert_eq!(loaded, prefs);
        assert!(loaded.is_dismissed("v2.0.0"));
        assert!(!loaded.is_dismissed("v2.1.0"));
    }

    #[test]
    fn tag_filter_operators() {
        let e = element("serde", &["serialization", "derive"]);
        let mut filter = TagFilter {
            tags: vec!["serialization".into(), "async".into()],
            operator: TagOperator::And,
        };
        assert!(!filter.matches(&e));
        filter.operator = TagOperator::Or;
        assert!(filter.matches(&e));
    }

    #[test]
    fn search_is_case_insensitive() {
        let prefs = Preferences {
            search: "SERDE".into(),
            ..Preferences::default()
        };
        assert!(prefs.shows(&element("serde", &[])));
        assert!(!prefs.shows(&element("tokio", &[])));
    }

    #[test]
    fn hide_marker_wins() {
        let mut prefs = Preferences::default();
        prefs.markers.insert("old".into(), Marker::Highlight);
        prefs.markers.insert("broken".into(), Marker::Hide);

        let e = element("x", &["old", "broken"]);
        assert_eq!(prefs.marker_for(&e), Some(Marker::Hide));
        assert!(!prefs.shows(&e));
        assert_eq!(prefs.marker_for(&element("y", &["old"])), Some(Marker::Highlight));
    }
}

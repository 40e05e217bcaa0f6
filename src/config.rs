//! Awesome configuration.
//!
//! Loaded from `~/.awesome/config.toml`. Every field has a default, so a
//! missing file is fine as long as `--owner` and `--repo` are given.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::compat::{DeployTarget, SchemaSource};
use crate::model::{Document, RepoRef};
use crate::session::SessionConfig;
use crate::yaml;

const DEFAULT_TEMPLATE_REPO: &str = "awesome-website/awesome-website";

/// Awesome configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Owner of the repository holding the list.
    pub owner: String,

    /// Repository holding the list. `owner/repo` is accepted too.
    pub repo: String,

    pub branch: String,

    /// Deploy workflow file name under `.github/workflows/`.
    pub workflow: String,

    pub list_path: String,
    pub readme_path: String,

    /// Document shown when the repository can't be read.
    pub fallback: Option<PathBuf>,

    /// Repository publishing template releases and their schemas.
    pub template_repo: String,

    /// Action the workflow pins to a template release. Defaults to the
    /// template repository.
    pub action_slug: Option<String>,

    /// Older names of the action, rewritten to `action-slug` on switch.
    pub legacy_action_slugs: Vec<String>,

    /// Where a release keeps its list schema, probed in order.
    pub schema_paths: Vec<String>,

    /// GitHub token, used when neither flag nor environment sets one.
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            workflow: "deploy.yml".to_string(),
            list_path: "awesome-list.yml".to_string(),
            readme_path: "README.md".to_string(),
            fallback: None,
            template_repo: DEFAULT_TEMPLATE_REPO.to_string(),
            action_slug: None,
            legacy_action_slugs: Vec::new(),
            schema_paths: vec![
                "schema/awesome-list.schema.json".to_string(),
                "awesome-list.schema.json".to_string(),
                "src/schema.json".to_string(),
            ],
            token: None,
        }
    }
}

impl Config {
    /// Load config from `~/.awesome/config.toml`, or defaults if the file
    /// doesn't exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::path().ok_or("could not determine home directory")?;
        Self::load_from(&path)
    }

    /// Load config from a specific file, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };
        toml::from_str(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    /// The config file path: `~/.awesome/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".awesome").join("config.toml"))
    }

    /// The repository holding the list.
    pub fn repo_ref(&self) -> Result<RepoRef, String> {
        if let Some(repo) = RepoRef::parse(&self.repo) {
            return Ok(repo);
        }
        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(format!(
                "no repository configured\n\
                 Pass --owner and --repo, or add to {}:\n\n\
                 owner = \"your-github-username\"\n\
                 repo = \"awesome-things\"",
                Self::path().map_or_else(|| "the config file".to_string(), |p| p.display().to_string())
            ));
        }
        Ok(RepoRef::new(&self.owner, &self.repo))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            branch: self.branch.clone(),
            workflow: self.workflow.clone(),
            list_path: self.list_path.clone(),
            readme_path: self.readme_path.clone(),
        }
    }

    pub fn schema_source(&self) -> Result<SchemaSource, String> {
        let template_repo = RepoRef::parse(&self.template_repo).ok_or_else(|| {
            format!(
                "template-repo must be 'owner/repo', got '{}'",
                self.template_repo
            )
        })?;
        Ok(SchemaSource {
            template_repo,
            paths: self.schema_paths.clone(),
        })
    }

    pub fn deploy_target(&self) -> DeployTarget {
        let primary = self
            .action_slug
            .clone()
            .unwrap_or_else(|| self.template_repo.clone());
        let mut slugs = vec![primary];
        slugs.extend(self.legacy_action_slugs.iter().cloned());
        DeployTarget {
            workflow: self.workflow.clone(),
            branch: self.branch.clone(),
            slugs,
        }
    }

    /// The document used when the repository can't be read.
    ///
    /// Without a configured fallback, or when it can't be read, this is an
    /// empty list skeleton.
    pub fn load_fallback(&self) -> Document {
        let Some(path) = &self.fallback else {
            return skeleton();
        };
        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| yaml::from_yaml(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(document) => document,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "fallback document unavailable");
                skeleton()
            }
        }
    }
}

fn skeleton() -> Document {
    match json!({"title": "", "description": "", "elements": []}) {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.branch, "main");
        assert_eq!(config.workflow, "deploy.yml");
        assert!(config.repo_ref().is_err());
    }

    #[test]
    fn kebab_case_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "owner = \"me\"\n\
             repo = \"awesome-rust\"\n\
             list-path = \"data/list.yml\"\n\
             legacy-action-slugs = [\"awesome-website/action\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.repo_ref().unwrap(), RepoRef::new("me", "awesome-rust"));
        assert_eq!(config.session_config().list_path, "data/list.yml");
        assert_eq!(config.readme_path, "README.md");
        assert_eq!(
            config.deploy_target().slugs,
            vec![DEFAULT_TEMPLATE_REPO, "awesome-website/action"]
        );
    }

    #[test]
    fn repo_slug_form() {
        let config = Config {
            repo: "me/awesome-rust".into(),
            ..Config::default()
        };
        assert_eq!(config.repo_ref().unwrap(), RepoRef::new("me", "awesome-rust"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "branch = [").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.starts_with("invalid config at"));
    }

    #[test]
    fn fallback_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fallback.yml");
        fs::write(&path, "title: Offline\nelements: []\n").unwrap();

        let mut config = Config {
            fallback: Some(path),
            ..Config::default()
        };
        assert_eq!(config.load_fallback()["title"], "Offline");

        config.fallback = Some(dir.path().join("missing.yml"));
        assert_eq!(config.load_fallback(), skeleton());

        config.fallback = None;
        assert_eq!(config.load_fallback()["elements"], json!([]));
    }
}

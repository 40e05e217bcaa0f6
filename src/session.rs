//! List session: the remote list document combined with locally staged
//! edits.
//!
//! A session owns the merge of the base document (what the repository
//! holds at the current revision) and the overlay (what the user has staged
//! on top). Every mutation goes through the deploy gate: a fresh workflow
//! status is fetched immediately before the overlay is written, and the
//! write is refused while a deploy is queued or running.
//!
//! Reads never fail hard. If the repository can't be reached, the session
//! falls back to a bundled document and becomes read-only.

use jiff::Timestamp;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::diff;
use crate::github::{DocumentStore, StoreError};
use crate::model::{
    AwesomeList, CommitInfo, Document, FileWrite, Overlay, Violation, WorkflowRunStatus,
    find_element,
};
use crate::storage::{ChangeCache, Storage, StorageError};
use crate::yaml::{self, README, YamlError};

/// Errors surfaced to the caller from mutating operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot edit or push while the site is being rebuilt{}", run_url(.0))]
    BuildInProgress(Box<WorkflowRunStatus>),

    #[error("the repository could not be reached; the list is read-only")]
    Offline,

    #[error("there are no unsaved changes to push")]
    NothingToPush,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Yaml(#[from] YamlError),
}

fn run_url(status: &WorkflowRunStatus) -> String {
    status
        .latest_run
        .as_ref()
        .map(|run| format!(" ({})", run.html_url))
        .unwrap_or_default()
}

pub type Result<T> = core::result::Result<T, SessionError>;

/// Where a session's files live in the repository.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub branch: String,
    pub workflow: String,
    pub list_path: String,
    pub readme_path: String,
}

/// Where the base document came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Read from the repository at this revision.
    Remote { revision: String },

    /// The bundled document, used when the repository couldn't be read.
    /// `revision` is set when only the list file was missing.
    Fallback { revision: Option<String> },
}

/// The base and merged views of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    /// The last known published document.
    pub old: Document,

    /// The published document with staged edits folded on top.
    pub new: Document,
}

/// What a successful push produced.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub commit: CommitInfo,
    pub readme_commit: Option<CommitInfo>,

    /// Invariant violations in the pushed document. Reported, not blocking.
    pub violations: Vec<Violation>,
}

/// One editing session over a repository's list.
pub struct ListSession<S> {
    store: S,
    config: SessionConfig,
    source: DocumentSource,
    base: Document,
    overlay: Overlay,
    list_sha: Option<String>,
    readme_sha: Option<String>,

    /// `None` when the revision couldn't be resolved; the session is
    /// read-only then.
    cache: Option<ChangeCache>,
}

impl<S: DocumentStore> ListSession<S> {
    /// Load the list from the repository and the staged overlay from local
    /// storage.
    ///
    /// Remote failures are logged and replaced by `fallback`. Only local
    /// storage failures are returned.
    pub fn open(
        store: S,
        config: SessionConfig,
        storage: &Storage,
        fallback: Document,
    ) -> Result<Self> {
        let revision = match store.latest_commit(&config.branch) {
            Ok(commit) => Some(commit.sha),
            Err(e) => {
                warn!(error = %e, branch = %config.branch, "could not resolve the current revision");
                None
            }
        };

        let mut session = Self {
            store,
            config,
            source: DocumentSource::Fallback { revision: None },
            base: fallback,
            overlay: Overlay::new(),
            list_sha: None,
            readme_sha: None,
            cache: None,
        };

        let Some(revision) = revision else {
            return Ok(session);
        };

        match session.load_remote(&revision) {
            Ok(()) => {
                session.source = DocumentSource::Remote {
                    revision: revision.clone(),
                };
            }
            Err(SessionError::Store(StoreError::NotFound { path })) => {
                warn!(%path, "list not found in the repository, using the bundled document");
                session.source = DocumentSource::Fallback {
                    revision: Some(revision.clone()),
                };
            }
            Err(e) => {
                warn!(error = %e, "could not load the list, using the bundled document");
                session.source = DocumentSource::Fallback {
                    revision: Some(revision.clone()),
                };
            }
        }

        let cache = storage.changes(session.store.repo(), &revision)?;
        session.overlay = cache.read()?;
        session.cache = Some(cache);
        debug!(
            %revision,
            staged = session.overlay.len(),
            "opened list session"
        );
        Ok(session)
    }

    /// Read the list and readme at `revision`.
    fn load_remote(&mut self, revision: &str) -> Result<()> {
        let list = self.store.read_file(&self.config.list_path, revision)?;
        debug!(path = %list.path, sha = %list.sha, "read list");
        let mut document = yaml::from_yaml(&list.content)?;

        match self.store.read_file(&self.config.readme_path, revision) {
            Ok(readme) => {
                document.insert(README.to_string(), Value::String(readme.content));
                self.readme_sha = Some(readme.sha);
            }
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => warn!(error = %e, "could not load the readme"),
        }

        self.base = document;
        self.list_sha = Some(list.sha);
        Ok(())
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    /// The revision staged edits are scoped to, when known.
    pub fn revision(&self) -> Option<&str> {
        self.cache.as_ref().map(ChangeCache::revision)
    }

    /// Whether edits can be staged and pushed.
    pub fn is_writable(&self) -> bool {
        self.cache.is_some()
    }

    /// When the staged overlay was last saved.
    pub fn staged_at(&self) -> Result<Option<Timestamp>> {
        match &self.cache {
            Some(cache) if !self.overlay.is_empty() => Ok(cache.saved_at()?),
            _ => Ok(None),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// The published document and the document with staged edits.
    pub fn content(&self) -> Content {
        Content {
            old: self.base.clone(),
            new: self.overlay.apply_to(&self.base),
        }
    }

    /// Staged keys whose value differs from the published document.
    pub fn changed_keys(&self) -> Vec<&str> {
        let new = self.overlay.apply_to(&self.base);
        diff::changed_keys(&self.overlay, &self.base, &new)
    }

    /// Whether any staged edit differs from the published document.
    ///
    /// A field edited and then restored to its published value is not an
    /// unsaved change.
    pub fn has_unsaved_changes(&self) -> bool {
        !self.changed_keys().is_empty()
    }

    /// Fresh deploy workflow status.
    pub fn workflow_status(&self) -> Result<WorkflowRunStatus> {
        Ok(self
            .store
            .workflow_status(&self.config.workflow, &self.config.branch)?)
    }

    /// Refuse when a deploy is queued or running. Always asks the host;
    /// a status observed earlier never authorizes a write.
    fn ensure_not_building(&self) -> Result<()> {
        let status = self.workflow_status()?;
        if status.is_running {
            warn!(
                run = ?status.latest_run.as_ref().map(|r| r.id),
                "refusing to modify the list during a deploy"
            );
            return Err(SessionError::BuildInProgress(Box::new(status)));
        }
        Ok(())
    }

    /// Stage a partial update. Keys replace their published values whole.
    pub fn update_list(&mut self, partial: Overlay) -> Result<()> {
        if self.cache.is_none() {
            return Err(SessionError::Offline);
        }
        self.ensure_not_building()?;
        let Some(cache) = &self.cache else {
            return Err(SessionError::Offline);
        };
        self.overlay = cache.update(|overlay| overlay.merge(partial))?;
        Ok(())
    }

    /// Stage an edit to one element's fields, found by `id` or `name`.
    ///
    /// The element keeps its position in the list.
    pub fn update_element(&mut self, key: &str, fields: Document) -> Result<bool> {
        let new = self.content().new;
        let mut elements = elements_of(&new);
        let Some(index) = find_element(&elements, key) else {
            return Ok(false);
        };
        if let Value::Object(element) = &mut elements[index] {
            for (field, value) in fields {
                element.insert(field, value);
            }
        }
        let mut partial = Overlay::new();
        partial.set("elements", Value::Array(elements));
        self.update_list(partial)?;
        Ok(true)
    }

    /// Stage removal of one element, found by `id` or `name`.
    pub fn remove_element(&mut self, key: &str) -> Result<bool> {
        let new = self.content().new;
        let mut elements = elements_of(&new);
        let Some(index) = find_element(&elements, key) else {
            return Ok(false);
        };
        elements.remove(index);
        let mut partial = Overlay::new();
        partial.set("elements", Value::Array(elements));
        self.update_list(partial)?;
        Ok(true)
    }

    /// Drop every staged edit. The published document is untouched.
    pub fn clear_changes(&mut self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.clear()?;
        }
        self.overlay = Overlay::new();
        Ok(())
    }

    /// Adopt a just-pushed document as the new base and drop the overlay.
    ///
    /// No refetch: the pushed content is the published content, and the
    /// host may not serve it back yet.
    pub fn sync_remote_list(&mut self, pushed: Document, revision: &str) -> Result<()> {
        self.base = pushed;
        self.overlay = Overlay::new();
        if let Some(cache) = &mut self.cache {
            cache.set_revision(revision);
            cache.clear()?;
        }
        self.source = DocumentSource::Remote {
            revision: revision.to_string(),
        };
        Ok(())
    }

    /// The readme landed in its own commit. Move the base and the cache to
    /// that commit so the remaining edits stay staged if the list write
    /// fails.
    fn record_readme(&mut self, revision: &str, readme: String) -> Result<()> {
        self.base.insert(README.to_string(), Value::String(readme));
        if let Some(cache) = &mut self.cache {
            cache.set_revision(revision);
            cache.write(&self.overlay)?;
        }
        match &mut self.source {
            DocumentSource::Remote { revision: current }
            | DocumentSource::Fallback {
                revision: Some(current),
            } => *current = revision.to_string(),
            DocumentSource::Fallback { revision: None } => {}
        }
        Ok(())
    }

    /// Commit the staged document to the repository.
    ///
    /// The readme is written to its own file when it changed, and the list
    /// only when a field other than the readme changed. On success the
    /// pushed document becomes the base.
    pub fn push(&mut self, message: &str) -> Result<PushOutcome> {
        if self.cache.is_none() {
            return Err(SessionError::Offline);
        }
        if !self.has_unsaved_changes() {
            return Err(SessionError::NothingToPush);
        }
        self.ensure_not_building()?;

        let new = self.content().new;
        let violations = match AwesomeList::from_document(&new) {
            Ok(list) => list.validate(),
            Err(e) => {
                warn!(error = %e, "pushed list does not match the expected shape");
                Vec::new()
            }
        };
        for violation in &violations {
            warn!(%violation, "list invariant violated");
        }

        let readme_changed = match (self.base.get(README), new.get(README)) {
            (old, Some(new)) => old.is_none_or(|old| !diff::deep_equal(old, new)),
            (_, None) => false,
        };
        let readme_commit = match new.get(README) {
            Some(Value::String(text)) if readme_changed => {
                let written = self.store.write_file(FileWrite {
                    path: self.config.readme_path.clone(),
                    message: message.to_string(),
                    content: text.clone(),
                    sha: self.readme_sha.clone(),
                    branch: self.config.branch.clone(),
                })?;
                self.readme_sha = Some(written.sha);
                self.record_readme(&written.commit.sha, text.clone())?;
                Some(written.commit)
            }
            _ => None,
        };

        let list_changed = self.changed_keys().iter().any(|key| *key != README);
        let commit = match readme_commit.clone() {
            Some(commit) if !list_changed => commit,
            _ => {
                let written = self.store.write_file(FileWrite {
                    path: self.config.list_path.clone(),
                    message: message.to_string(),
                    content: yaml::to_yaml(&new)?,
                    sha: self.list_sha.clone(),
                    branch: self.config.branch.clone(),
                })?;
                info!(
                    commit = %written.commit.sha,
                    path = %self.config.list_path,
                    "pushed list"
                );
                self.list_sha = Some(written.sha);
                written.commit
            }
        };
        self.sync_remote_list(new, &commit.sha)?;

        Ok(PushOutcome {
            commit,
            readme_commit,
            violations,
        })
    }
}

/// The raw `elements` array of a document, empty when absent.
fn elements_of(document: &Document) -> Vec<Value> {
    match document.get("elements") {
        Some(Value::Array(elements)) => elements.clone(),
        _ => Vec::new(),
    }
}

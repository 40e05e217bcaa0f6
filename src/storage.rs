//! Local persistence for per-repository editing state.
//!
//! Each repository gets its own directory under the storage root:
//!
//! ```text
//! <root>/<owner>/<repo>/
//!   changes.json       # Staged overlay, scoped to one remote revision
//!   preferences.json   # View preferences and dismissed update notices
//! ```
//!
//! One process edits a repository at a time. Concurrent writers (two
//! shells, two machines sharing a home directory) are not coordinated.

mod changes;
mod preferences;

pub use changes::ChangeCache;
pub use preferences::{Marker, Preferences, TagFilter, TagOperator};

use std::{fs, io, path::PathBuf};

use crate::model::RepoRef;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Local file-based storage for per-repository state.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a new storage instance rooted at the given directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the default storage root: `~/.awesome/repos/`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".awesome").join("repos"))
    }

    /// The staged-changes cache for a repository at a revision.
    pub fn changes(&self, repo: &RepoRef, revision: &str) -> Result<ChangeCache> {
        Ok(ChangeCache::new(self.repo_dir(repo)?, revision))
    }

    /// Directory holding a repository's state, created on first use.
    fn repo_dir(&self, repo: &RepoRef) -> Result<PathBuf> {
        let dir = self.root.join(&repo.owner).join(&repo.repo);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[test]
    fn creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("repos");
        Storage::new(&root).unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn repositories_are_isolated() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path()).unwrap();

        let a = storage.repo_dir(&RepoRef::new("o", "a")).unwrap();
        let b = storage.repo_dir(&RepoRef::new("o", "b")).unwrap();

        assert_ne!(a, b);
        assert!(a.ends_with("o/a"));
        assert!(b.is_dir());
    }
}

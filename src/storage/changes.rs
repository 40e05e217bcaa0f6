//! Staged changes: the overlay of unpublished edits, scoped to the remote
//! revision it was made against.
//!
//! An overlay saved against one revision is never applied on top of a
//! document fetched at another. Reading with a different revision discards
//! the stored overlay and removes `changes.json`. A missing file is a valid
//! empty overlay.

use std::path::PathBuf;
use std::{fs, io};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::Overlay;

use super::Result;

const FILE_NAME: &str = "changes.json";

/// What `changes.json` holds.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredChanges {
    revision: String,
    overlay: Overlay,
    saved_at: Timestamp,
}

/// Commit-scoped overlay cache for one repository.
pub struct ChangeCache {
    path: PathBuf,
    revision: String,
}

impl ChangeCache {
    /// A cache in `dir` for edits made against `revision`.
    pub fn new(dir: impl Into<PathBuf>, revision: impl Into<String>) -> Self {
        Self {
            path: dir.into().join(FILE_NAME),
            revision: revision.into(),
        }
    }

    /// The revision new writes are stamped with.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Move the cache to a new revision. Later reads discard anything
    /// stored against the old one.
    pub fn set_revision(&mut self, revision: impl Into<String>) {
        self.revision = revision.into();
    }

    /// Load the overlay staged against the current revision.
    ///
    /// An overlay stored against any other revision is dropped and the
    /// file removed.
    pub fn read(&self) -> Result<Overlay> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Overlay::new()),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredChanges = match serde_json::from_str(&json) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable staged changes");
                self.clear()?;
                return Ok(Overlay::new());
            }
        };
        if stored.revision != self.revision {
            info!(
                stored = %stored.revision,
                current = %self.revision,
                fields = stored.overlay.len(),
                "discarding changes staged against an older revision"
            );
            self.clear()?;
            return Ok(Overlay::new());
        }
        Ok(stored.overlay)
    }

    /// Replace the stored overlay, stamped with the current revision.
    pub fn write(&self, overlay: &Overlay) -> Result<()> {
        let stored = StoredChanges {
            revision: self.revision.clone(),
            overlay: overlay.clone(),
            saved_at: Timestamp::now(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    /// Read, modify, and write back the overlay. Returns the new overlay.
    pub fn update(&self, change: impl FnOnce(&mut Overlay)) -> Result<Overlay> {
        let mut overlay = self.read()?;
        change(&mut overlay);
        self.write(&overlay)?;
        Ok(overlay)
    }

    /// Remove the stored overlay.
    ///
    /// Idempotent: does nothing if the file doesn't exist.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// When the stored overlay was last saved, if one exists for the
    /// current revision.
    pub fn saved_at(&self) -> Result<Option<Timestamp>> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str::<StoredChanges>(&json)
            .ok()
            .filter(|s| s.revision == self.revision)
            .map(|s| s.saved_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    fn title(text: &str) -> Overlay {
        let mut overlay = Overlay::new();
        overlay.set("title", json!(text));
        overlay
    }

    #[test]
    fn read_without_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path(), "c1");
        assert!(cache.read().unwrap().is_empty());
    }

    #[test]
    fn write_and_read_same_revision() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path(), "c1");

        cache.write(&title("B")).unwrap();

        assert_eq!(cache.read().unwrap(), title("B"));
        assert!(cache.saved_at().unwrap().is_some());
    }

    #[test]
    fn other_revision_discards_and_clears() {
        let dir = TempDir::new().unwrap();
        ChangeCache::new(dir.path(), "c1").write(&title("B")).unwrap();

        let stale = ChangeCache::new(dir.path(), "c2");
        assert!(stale.read().unwrap().is_empty());
        assert!(!dir.path().join(FILE_NAME).exists());

        // The mismatch already cleared storage; the original revision
        // doesn't get its overlay back.
        assert!(ChangeCache::new(dir.path(), "c1").read().unwrap().is_empty());
    }

    #[test]
    fn writes_are_stamped_with_current_revision() {
        let dir = TempDir::new().unwrap();
        let mut cache = ChangeCache::new(dir.path(), "c1");
        cache.set_revision("c2");
        cache.write(&title("B")).unwrap();

        assert_eq!(ChangeCache::new(dir.path(), "c2").read().unwrap(), title("B"));
        assert_eq!(cache.revision(), "c2");
    }

    #[test]
    fn moving_revision_hides_old_overlay() {
        let dir = TempDir::new().unwrap();
        let mut cache = ChangeCache::new(dir.path(), "c1");
        cache.write(&title("B")).unwrap();

        cache.set_revision("c2");
        assert!(cache.read().unwrap().is_empty());
    }

    #[test]
    fn update_folds_into_stored_overlay() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path(), "c1");
        cache.write(&title("B")).unwrap();

        let updated = cache
            .update(|o| o.set("author", json!("me")))
            .unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(cache.read().unwrap(), updated);
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = ChangeCache::new(dir.path(), "c1");
        cache.write(&title("B")).unwrap();

        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.read().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_discarded() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FILE_NAME), "{not json").unwrap();

        let cache = ChangeCache::new(dir.path(), "c1");
        assert!(cache.read().unwrap().is_empty());
        assert!(!dir.path().join(FILE_NAME).exists());
    }
}

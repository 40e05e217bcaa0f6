//! In-memory [`DocumentStore`] for tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

use jiff::Timestamp;

use crate::model::{CommitInfo, FileWrite, RemoteFile, RepoRef, WorkflowRun, WrittenFile};

use super::{DocumentStore, Result, StoreError};

/// A fake git host holding files per `(repo, reference, path)`.
///
/// Files stored under the reference `"*"` are visible at every reference.
pub struct MemoryStore {
    repo: RepoRef,
    files: RefCell<HashMap<(RepoRef, String, String), (String, String)>>,
    head: RefCell<String>,
    commits: Cell<u32>,
    blobs: Cell<u32>,
    run_states: RefCell<VecDeque<&'static str>>,
    releases: RefCell<HashMap<RepoRef, String>>,
    offline: Cell<bool>,
    failing_path: RefCell<Option<String>>,
    status_calls: Cell<u32>,
    pub writes: RefCell<Vec<FileWrite>>,
}

impl MemoryStore {
    pub fn new(repo: RepoRef) -> Self {
        Self {
            repo,
            files: RefCell::new(HashMap::new()),
            head: RefCell::new("c1".to_string()),
            commits: Cell::new(1),
            blobs: Cell::new(0),
            run_states: RefCell::new(VecDeque::new()),
            releases: RefCell::new(HashMap::new()),
            offline: Cell::new(false),
            failing_path: RefCell::new(None),
            status_calls: Cell::new(0),
            writes: RefCell::new(Vec::new()),
        }
    }

    /// Put a file in the bound repository at every reference.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        let repo = self.repo.clone();
        self.insert(&repo, "*", path, content);
        self
    }

    pub fn insert(&self, repo: &RepoRef, reference: &str, path: &str, content: &str) {
        self.blobs.set(self.blobs.get() + 1);
        let sha = format!("blob-{}", self.blobs.get());
        self.files.borrow_mut().insert(
            (repo.clone(), reference.to_string(), path.to_string()),
            (content.to_string(), sha),
        );
    }

    pub fn set_release(&self, repo: &RepoRef, tag: &str) {
        self.releases
            .borrow_mut()
            .insert(repo.clone(), tag.to_string());
    }

    /// Queue workflow states returned by successive status queries.
    /// The last queued state sticks once the queue drains to one.
    pub fn queue_runs(&self, states: &[&'static str]) {
        self.run_states.borrow_mut().extend(states);
    }

    /// Make every call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.set(offline);
    }

    /// Make writes to `path` fail; other calls still succeed.
    pub fn fail_writes_to(&self, path: &str) {
        *self.failing_path.borrow_mut() = Some(path.to_string());
    }

    pub fn head(&self) -> String {
        self.head.borrow().clone()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.get()
    }

    /// Current content of a file in the bound repository.
    pub fn content(&self, path: &str) -> Option<String> {
        self.lookup(&self.repo, "*", path).map(|(content, _)| content)
    }

    fn lookup(&self, repo: &RepoRef, reference: &str, path: &str) -> Option<(String, String)> {
        let files = self.files.borrow();
        files
            .get(&(repo.clone(), reference.to_string(), path.to_string()))
            .or_else(|| files.get(&(repo.clone(), "*".to_string(), path.to_string())))
            .cloned()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.get() {
            Err(StoreError::Provider("network unreachable".into()))
        } else {
            Ok(())
        }
    }
}

impl DocumentStore for MemoryStore {
    fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn read_file_at(&self, repo: &RepoRef, path: &str, reference: &str) -> Result<RemoteFile> {
        self.check_online()?;
        let (content, sha) =
            self.lookup(repo, reference, path)
                .ok_or_else(|| StoreError::NotFound {
                    path: path.to_string(),
                })?;
        Ok(RemoteFile {
            path: path.to_string(),
            sha,
            content,
        })
    }

    fn put_file(&self, write: &FileWrite) -> Result<WrittenFile> {
        self.check_online()?;
        if self.failing_path.borrow().as_deref() == Some(write.path.as_str()) {
            return Err(StoreError::Provider("network unreachable".into()));
        }
        let current = self.lookup(&self.repo, "*", &write.path).map(|(_, sha)| sha);
        if current != write.sha {
            return Err(StoreError::Provider(format!(
                "{} does not match {:?}",
                write.path, write.sha
            )));
        }
        self.writes.borrow_mut().push(write.clone());
        let repo = self.repo.clone();
        self.insert(&repo, "*", &write.path, &write.content);

        self.commits.set(self.commits.get() + 1);
        let sha = format!("c{}", self.commits.get());
        *self.head.borrow_mut() = sha.clone();

        let blob = self.lookup(&repo, "*", &write.path).map(|(_, sha)| sha);
        Ok(WrittenFile {
            sha: blob.unwrap_or_default(),
            commit: CommitInfo {
                sha,
                message: write.message.clone(),
                html_url: None,
                date: None,
            },
        })
    }

    fn workflow_runs(&self, workflow: &str, _branch: &str) -> Result<Vec<WorkflowRun>> {
        self.check_online()?;
        self.status_calls.set(self.status_calls.get() + 1);
        let mut states = self.run_states.borrow_mut();
        let state = if states.len() > 1 {
            states.pop_front()
        } else {
            states.front().copied()
        };
        Ok(state
            .map(|status| WorkflowRun {
                id: 1,
                status: status.to_string(),
                conclusion: None,
                html_url: "https://github.com/o/r/actions/runs/1".into(),
                created_at: Timestamp::UNIX_EPOCH,
                workflow_name: workflow.to_string(),
            })
            .into_iter()
            .collect())
    }

    fn latest_commit(&self, _branch: &str) -> Result<CommitInfo> {
        self.check_online()?;
        Ok(CommitInfo {
            sha: self.head(),
            message: "head".into(),
            html_url: None,
            date: None,
        })
    }

    fn commits_since(&self, _branch: &str, since: &str) -> Result<Vec<CommitInfo>> {
        self.check_online()?;
        let from: u32 = since.trim_start_matches('c').parse().unwrap_or(0);
        Ok((from + 1..=self.commits.get())
            .map(|n| CommitInfo {
                sha: format!("c{n}"),
                message: format!("commit {n}"),
                html_url: None,
                date: None,
            })
            .collect())
    }

    fn latest_release(&self, repo: &RepoRef) -> Result<String> {
        self.check_online()?;
        self.releases
            .borrow()
            .get(repo)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: format!("{repo} releases"),
            })
    }
}

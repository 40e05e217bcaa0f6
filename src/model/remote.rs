//! What the git host reports: repositories, files, commits, workflow runs.

use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// An `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse `owner/repo`.
    pub fn parse(slug: &str) -> Option<Self> {
        let (owner, repo) = slug.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo))
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A file read from the host, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,

    /// Blob revision marker; required to overwrite the file.
    pub sha: String,

    pub content: String,
}

/// A request to create or overwrite a file with a new commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub message: String,
    pub content: String,

    /// Current blob sha. `None` asks the store to resolve it first.
    pub sha: Option<String>,

    pub branch: String,
}

/// The result of a file write: the new blob and the commit that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub sha: String,
    pub commit: CommitInfo,
}

/// A commit on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub html_url: Option<String>,
    pub date: Option<Timestamp>,
}

impl CommitInfo {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }
}

/// A single run of a deploy workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: u64,
    pub status: String,
    pub conclusion: Option<String>,
    pub html_url: String,
    pub created_at: Timestamp,
    pub workflow_name: String,
}

impl WorkflowRun {
    /// Queued or in progress.
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "in_progress" | "queued")
    }
}

/// Whether a deploy is under way. Acts as the write lock for list edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunStatus {
    pub is_running: bool,
    pub latest_run: Option<WorkflowRun>,
}

impl WorkflowRunStatus {
    /// Classify the latest runs, newest first.
    ///
    /// Running when any listed run is queued or in progress; that run is
    /// reported as the latest. Otherwise the newest run is.
    pub fn from_runs(runs: Vec<WorkflowRun>) -> Self {
        let active = runs.iter().position(WorkflowRun::is_active);
        let is_running = active.is_some();
        let latest_run = runs.into_iter().nth(active.unwrap_or(0));
        Self {
            is_running,
            latest_run,
        }
    }
}

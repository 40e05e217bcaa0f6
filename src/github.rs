//! Versioned document store: file contents, commits, and deploy workflow
//! runs on GitHub.
//!
//! [`DocumentStore`] is the seam the rest of the crate talks to.
//! [`GitHubClient`] implements it by driving `gh api`, authenticated with
//! the resolved token through `GH_TOKEN`.
//!
//! Writes create real commits. They are never retried.

#[cfg(test)]
pub mod memory;

use std::io::Write;
use std::process::{Command, Stdio};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jiff::Timestamp;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::model::{
    CommitInfo, FileWrite, RemoteFile, RepoRef, WorkflowRun, WorkflowRunStatus, WrittenFile,
};

/// Attempts for read-only calls.
const READ_ATTEMPTS: u32 = 3;

/// Runs listed when classifying workflow status.
const RUNS_PER_PAGE: u32 = 5;

/// Errors from the git host.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The path does not exist at the reference, or names a directory.
    #[error("file not found or is a directory: {path}")]
    NotFound { path: String },

    #[error("GitHub request failed: {0}")]
    Provider(String),

    #[error("unexpected response from GitHub: {0}")]
    Decode(String),

    #[error("no `uses: <action>@<ref>` line for {slugs} in {path}")]
    ActionNotFound { path: String, slugs: String },
}

pub type Result<T> = core::result::Result<T, StoreError>;

/// Read and write access to the repository that hosts a list.
pub trait DocumentStore {
    /// The repository this store is bound to.
    fn repo(&self) -> &RepoRef;

    /// Read a file from any repository at a branch, tag, or commit.
    fn read_file_at(&self, repo: &RepoRef, path: &str, reference: &str) -> Result<RemoteFile>;

    /// Create or overwrite a file. `write.sha` must be the current blob sha,
    /// or `None` when the file doesn't exist yet.
    fn put_file(&self, write: &FileWrite) -> Result<WrittenFile>;

    /// Latest runs of a workflow on a branch, newest first.
    fn workflow_runs(&self, workflow: &str, branch: &str) -> Result<Vec<WorkflowRun>>;

    /// Latest commit on a branch.
    fn latest_commit(&self, branch: &str) -> Result<CommitInfo>;

    /// Commits on `branch` after `since`, oldest first.
    fn commits_since(&self, branch: &str, since: &str) -> Result<Vec<CommitInfo>>;

    /// Tag of the latest published release of a repository.
    fn latest_release(&self, repo: &RepoRef) -> Result<String>;

    /// Read a file from the bound repository.
    fn read_file(&self, path: &str, reference: &str) -> Result<RemoteFile> {
        self.read_file_at(self.repo(), path, reference)
    }

    /// Write a file, resolving its current sha first when none is given.
    fn write_file(&self, mut write: FileWrite) -> Result<WrittenFile> {
        if write.sha.is_none() {
            write.sha = match self.read_file(&write.path, &write.branch) {
                Ok(file) => Some(file.sha),
                Err(StoreError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };
        }
        self.put_file(&write)
    }

    /// Whether a deploy run is queued or in progress.
    fn workflow_status(&self, workflow: &str, branch: &str) -> Result<WorkflowRunStatus> {
        Ok(WorkflowRunStatus::from_runs(
            self.workflow_runs(workflow, branch)?,
        ))
    }

    /// The action reference currently pinned in a workflow file.
    fn pinned_action_ref(&self, workflow: &str, branch: &str, slugs: &[String]) -> Result<String> {
        let path = workflow_path(workflow);
        let file = self.read_file(&path, branch)?;
        find_action_ref(&file.content, slugs).ok_or_else(|| StoreError::ActionNotFound {
            path,
            slugs: slugs.join(", "),
        })
    }

    /// Point the workflow at a different action reference and commit the
    /// change, which triggers a redeploy.
    ///
    /// `slugs[0]` is the current action slug; the rest are legacy slugs
    /// tried in order and rewritten to the current one.
    fn update_workflow_action(
        &self,
        workflow: &str,
        branch: &str,
        slugs: &[String],
        new_ref: &str,
        message: &str,
    ) -> Result<WrittenFile> {
        let path = workflow_path(workflow);
        let file = self.read_file(&path, branch)?;
        let content = replace_action_ref(&file.content, slugs, new_ref).ok_or_else(|| {
            StoreError::ActionNotFound {
                path: path.clone(),
                slugs: slugs.join(", "),
            }
        })?;
        self.put_file(&FileWrite {
            path,
            message: message.to_string(),
            content,
            sha: Some(file.sha),
            branch: branch.to_string(),
        })
    }
}

/// Path of a workflow definition inside the repository.
pub fn workflow_path(workflow: &str) -> String {
    format!(".github/workflows/{workflow}")
}

fn action_pattern(slug: &str) -> Option<Regex> {
    Regex::new(&format!(
        r##"(uses:\s*['"]?){}@([^\s'"#]+)"##,
        regex::escape(slug)
    ))
    .ok()
}

/// Find the reference pinned for the first matching slug.
pub fn find_action_ref(workflow: &str, slugs: &[String]) -> Option<String> {
    slugs.iter().find_map(|slug| {
        action_pattern(slug)?
            .captures(workflow)
            .map(|c| c[2].to_string())
    })
}

/// Rewrite `uses: <slug>@<ref>` lines to `uses: <slugs[0]>@<new_ref>`.
///
/// Tries each slug in order and rewrites only the first that matches.
pub fn replace_action_ref(workflow: &str, slugs: &[String], new_ref: &str) -> Option<String> {
    let primary = slugs.first()?;
    slugs.iter().find_map(|slug| {
        let pattern = action_pattern(slug)?;
        pattern.is_match(workflow).then(|| {
            let replacement = format!("${{1}}{primary}@{new_ref}");
            pattern.replace_all(workflow, replacement.as_str()).into_owned()
        })
    })
}

// ── gh-backed client ──

/// [`DocumentStore`] backed by the GitHub REST API through `gh api`.
pub struct GitHubClient {
    repo: RepoRef,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(repo: RepoRef, token: Option<String>) -> Self {
        Self { repo, token }
    }

    /// GET with bounded retry. `NotFound` is returned immediately.
    fn get(&self, endpoint: &str) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.gh(&["api", endpoint], None) {
                Err(StoreError::Provider(message)) if attempt < READ_ATTEMPTS => {
                    warn!(endpoint, attempt, %message, "GitHub read failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn gh(&self, args: &[&str], input: Option<&[u8]>) -> Result<String> {
        debug!(?args, "gh");
        let mut command = Command::new("gh");
        command
            .args(args)
            .env("GH_PROMPT_DISABLED", "1")
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(token) = &self.token {
            command.env("GH_TOKEN", token);
        }

        let mut child = command
            .spawn()
            .map_err(|e| StoreError::Provider(format!("failed to run gh: {e}")))?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin
                .write_all(input)
                .map_err(|e| StoreError::Provider(format!("failed to write to gh: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| StoreError::Provider(format!("failed to run gh: {e}")))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let endpoint = args.get(1).copied().unwrap_or_default();
            Err(classify_failure(
                endpoint,
                &String::from_utf8_lossy(&output.stderr),
                &String::from_utf8_lossy(&output.stdout),
            ))
        }
    }
}

impl DocumentStore for GitHubClient {
    fn repo(&self) -> &RepoRef {
        &self.repo
    }

    fn read_file_at(&self, repo: &RepoRef, path: &str, reference: &str) -> Result<RemoteFile> {
        let endpoint = format!("repos/{repo}/contents/{path}?ref={reference}");
        let json = self.get(&endpoint).map_err(|e| match e {
            StoreError::NotFound { .. } => StoreError::NotFound {
                path: path.to_string(),
            },
            other => other,
        })?;
        parse_contents(path, &json)
    }

    fn put_file(&self, write: &FileWrite) -> Result<WrittenFile> {
        let endpoint = format!("repos/{}/contents/{}", self.repo, write.path);
        let mut body = serde_json::json!({
            "message": write.message,
            "content": STANDARD.encode(write.content.as_bytes()),
            "branch": write.branch,
        });
        if let Some(sha) = &write.sha {
            body["sha"] = serde_json::Value::String(sha.clone());
        }
        let json = self.gh(
            &["api", &endpoint, "--method", "PUT", "--input", "-"],
            Some(body.to_string().as_bytes()),
        )?;
        let written = parse_put_response(&json)?;
        debug!(path = %write.path, commit = %written.commit.sha, "committed file");
        Ok(written)
    }

    fn workflow_runs(&self, workflow: &str, branch: &str) -> Result<Vec<WorkflowRun>> {
        let endpoint = format!(
            "repos/{}/actions/workflows/{workflow}/runs?branch={branch}&per_page={RUNS_PER_PAGE}",
            self.repo
        );
        parse_workflow_runs(&self.get(&endpoint)?)
    }

    fn latest_commit(&self, branch: &str) -> Result<CommitInfo> {
        let endpoint = format!("repos/{}/commits/{branch}", self.repo);
        let commit: GhCommit = decode(&self.get(&endpoint)?)?;
        Ok(commit.into())
    }

    fn commits_since(&self, branch: &str, since: &str) -> Result<Vec<CommitInfo>> {
        let endpoint = format!("repos/{}/compare/{since}...{branch}", self.repo);
        let compare: GhCompare = decode(&self.get(&endpoint)?)?;
        Ok(compare.commits.into_iter().map(CommitInfo::from).collect())
    }

    fn latest_release(&self, repo: &RepoRef) -> Result<String> {
        let endpoint = format!("repos/{repo}/releases/latest");
        let release: GhRelease = decode(&self.get(&endpoint)?)?;
        Ok(release.tag_name)
    }
}

/// Map a failed `gh api` call to a store error.
///
/// `gh` reports HTTP failures on stderr as `gh: <message> (HTTP <code>)`
/// and prints the response body on stdout.
fn classify_failure(endpoint: &str, stderr: &str, stdout: &str) -> StoreError {
    if stderr.contains("(HTTP 404)") {
        return StoreError::NotFound {
            path: endpoint.to_string(),
        };
    }
    let message = serde_json::from_str::<GhErrorBody>(stdout)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            stderr
                .lines()
                .next()
                .unwrap_or("unknown error")
                .trim_start_matches("gh: ")
                .to_string()
        });
    StoreError::Provider(message)
}

/// Error body GitHub returns alongside a failed request.
#[derive(Deserialize)]
struct GhErrorBody {
    message: String,
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| StoreError::Decode(e.to_string()))
}

// ── Response shapes ──

/// JSON shape of `GET /repos/{repo}/contents/{path}` for a file.
#[derive(Deserialize)]
struct GhContents {
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

fn parse_contents(path: &str, json: &str) -> Result<RemoteFile> {
    let value: serde_json::Value = decode(json)?;
    // Directories come back as an array of entries.
    if value.is_array() {
        return Err(StoreError::NotFound {
            path: path.to_string(),
        });
    }
    let contents: GhContents =
        serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))?;
    if contents.kind != "file" {
        return Err(StoreError::NotFound {
            path: path.to_string(),
        });
    }
    if contents.encoding != "base64" {
        return Err(StoreError::Decode(format!(
            "{path}: unsupported encoding '{}'",
            contents.encoding
        )));
    }
    let compact: String = contents
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
    let content =
        String::from_utf8(bytes).map_err(|e| StoreError::Decode(format!("{path}: {e}")))?;
    Ok(RemoteFile {
        path: path.to_string(),
        sha: contents.sha,
        content,
    })
}

/// JSON shape of `PUT /repos/{repo}/contents/{path}`.
#[derive(Deserialize)]
struct GhPutResponse {
    content: GhPutContent,
    commit: GhGitCommit,
}

#[derive(Deserialize)]
struct GhPutContent {
    sha: String,
}

/// A commit object as embedded in the contents API.
#[derive(Deserialize)]
struct GhGitCommit {
    sha: String,
    message: String,
    html_url: Option<String>,
    author: Option<GhCommitAuthor>,
}

#[derive(Deserialize)]
struct GhCommitAuthor {
    date: Option<Timestamp>,
}

fn parse_put_response(json: &str) -> Result<WrittenFile> {
    let response: GhPutResponse = decode(json)?;
    Ok(WrittenFile {
        sha: response.content.sha,
        commit: CommitInfo {
            sha: response.commit.sha,
            message: response.commit.message,
            html_url: response.commit.html_url,
            date: response.commit.author.and_then(|a| a.date),
        },
    })
}

/// A commit as returned by the commits and compare APIs.
#[derive(Deserialize)]
struct GhCommit {
    sha: String,
    html_url: Option<String>,
    commit: GhCommitDetail,
}

#[derive(Deserialize)]
struct GhCommitDetail {
    message: String,
    author: Option<GhCommitAuthor>,
}

impl From<GhCommit> for CommitInfo {
    fn from(c: GhCommit) -> Self {
        Self {
            sha: c.sha,
            message: c.commit.message,
            html_url: c.html_url,
            date: c.commit.author.and_then(|a| a.date),
        }
    }
}

#[derive(Deserialize)]
struct GhCompare {
    commits: Vec<GhCommit>,
}

#[derive(Deserialize)]
struct GhRelease {
    tag_name: String,
}

/// JSON shape of `GET /repos/{repo}/actions/workflows/{id}/runs`.
#[derive(Deserialize)]
struct GhWorkflowRuns {
    workflow_runs: Vec<GhWorkflowRun>,
}

#[derive(Deserialize)]
struct GhWorkflowRun {
    id: u64,
    name: Option<String>,
    status: Option<String>,
    conclusion: Option<String>,
    html_url: String,
    created_at: Timestamp,
}

fn parse_workflow_runs(json: &str) -> Result<Vec<WorkflowRun>> {
    let runs: GhWorkflowRuns = decode(json)?;
    Ok(runs
        .workflow_runs
        .into_iter()
        .map(|r| WorkflowRun {
            id: r.id,
            status: r.status.unwrap_or_default(),
            conclusion: r.conclusion,
            html_url: r.html_url,
            created_at: r.created_at,
            workflow_name: r.name.unwrap_or_default(),
        })
        .collect())
}

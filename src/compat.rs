//! Template release compatibility.
//!
//! Before the site is pointed at a different template release, the list
//! must validate against that release's JSON Schema. The schema is read
//! from the template repository at the release tag, probing each candidate
//! path in order.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::github::{DocumentStore, StoreError};
use crate::model::{CommitInfo, Document, RepoRef, WorkflowRunStatus};
use crate::schema::{self, SchemaError, Validator};
use crate::storage::Preferences;
use crate::yaml::{self, YamlError};

/// At most this many issues are reported per check.
pub const MAX_ISSUES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum CompatError {
    #[error("{target} is not compatible with the current list: {}", .report.summary())]
    Blocked {
        target: String,
        report: Box<CompatibilityReport>,
    },

    #[error("cannot switch templates while the site is being rebuilt")]
    BuildInProgress(Box<WorkflowRunStatus>),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Yaml(#[from] YamlError),
}

pub type Result<T> = core::result::Result<T, CompatError>;

/// Where release schemas live.
#[derive(Debug, Clone)]
pub struct SchemaSource {
    pub template_repo: RepoRef,

    /// Candidate schema paths, probed in order.
    pub paths: Vec<String>,
}

/// The workflow whose pinned action selects the template release.
#[derive(Debug, Clone)]
pub struct DeployTarget {
    pub workflow: String,
    pub branch: String,

    /// Current action slug first, then legacy slugs.
    pub slugs: Vec<String>,
}

/// Which stage produced the issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    Yaml,
    Schema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CompatibilityStatus {
    Compatible,
    Incompatible,

    /// The schema uses constructs that can't be checked automatically.
    /// Editing and re-checking still work.
    Unsupported { reason: String },

    /// No schema at any candidate path: the release predates schemas.
    SchemaMissing,
}

/// Result of checking one document against one release.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    pub target: String,
    #[serde(flatten)]
    pub status: CompatibilityStatus,
    pub issues: Vec<String>,

    /// Issues found before truncating to [`MAX_ISSUES`].
    pub total_issues: usize,
    pub issue_source: Option<IssueSource>,
    pub schema_path: Option<String>,

    /// YAML skeleton of a document the schema accepts.
    pub example: Option<String>,
}

impl CompatibilityReport {
    fn new(target: &str, status: CompatibilityStatus) -> Self {
        Self {
            target: target.to_string(),
            status,
            issues: Vec::new(),
            total_issues: 0,
            issue_source: None,
            schema_path: None,
            example: None,
        }
    }

    fn with_issues(mut self, source: IssueSource, issues: Vec<String>) -> Self {
        self.total_issues = issues.len();
        self.issues = issues.into_iter().take(MAX_ISSUES).collect();
        self.issue_source = Some(source);
        self
    }

    pub fn is_compatible(&self) -> bool {
        self.status == CompatibilityStatus::Compatible
    }

    /// Whether a switch may proceed. `force` only overrides an unsupported
    /// schema, never a failed or impossible check.
    pub fn allows_switch(&self, force: bool) -> bool {
        match self.status {
            CompatibilityStatus::Compatible => true,
            CompatibilityStatus::Unsupported { .. } => force,
            CompatibilityStatus::Incompatible | CompatibilityStatus::SchemaMissing => false,
        }
    }

    /// One-line description for messages.
    pub fn summary(&self) -> String {
        match &self.status {
            CompatibilityStatus::Compatible => "compatible".to_string(),
            CompatibilityStatus::Incompatible => {
                let source = match self.issue_source {
                    Some(IssueSource::Yaml) => "YAML error",
                    _ => "schema issue",
                };
                let plural = if self.total_issues == 1 { "" } else { "s" };
                format!("{} {source}{plural}", self.total_issues)
            }
            CompatibilityStatus::Unsupported { reason } => {
                format!("schema type unsupported, cannot auto-validate ({reason})")
            }
            CompatibilityStatus::SchemaMissing => {
                "target version too old, it publishes no schema".to_string()
            }
        }
    }
}

/// A schema file found for a release.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub path: String,
    pub text: String,
}

/// Find the release's schema: the first candidate path that exists at
/// `target` wins. `None` when no candidate exists.
pub fn resolve_schema<S: DocumentStore>(
    store: &S,
    source: &SchemaSource,
    target: &str,
) -> core::result::Result<Option<ResolvedSchema>, StoreError> {
    for path in &source.paths {
        match store.read_file_at(&source.template_repo, path, target) {
            Ok(file) => {
                debug!(%path, %target, "found release schema");
                return Ok(Some(ResolvedSchema {
                    path: path.clone(),
                    text: file.content,
                }));
            }
            Err(StoreError::NotFound { .. }) => {
                debug!(%path, %target, "no schema at candidate path");
            }
            Err(e) => return Err(e),
        }
    }
    info!(%target, repo = %source.template_repo, "release publishes no schema");
    Ok(None)
}

/// Check a list document against a release. The readme is not part of the
/// checked document.
pub fn check<S: DocumentStore>(
    store: &S,
    source: &SchemaSource,
    target: &str,
    document: &Document,
) -> Result<CompatibilityReport> {
    let text = yaml::to_yaml(document)?;
    check_text(store, source, target, &text)
}

/// Check edited YAML text against a release.
///
/// A YAML syntax error is reported as a single [`IssueSource::Yaml`] issue
/// and no schema validation runs.
pub fn check_text<S: DocumentStore>(
    store: &S,
    source: &SchemaSource,
    target: &str,
    text: &str,
) -> Result<CompatibilityReport> {
    let Some(resolved) = resolve_schema(store, source, target)? else {
        return Ok(CompatibilityReport::new(target, CompatibilityStatus::SchemaMissing));
    };
    Ok(evaluate(target, &resolved, text))
}

fn evaluate(target: &str, resolved: &ResolvedSchema, text: &str) -> CompatibilityReport {
    let unsupported = |reason: String| {
        let mut report =
            CompatibilityReport::new(target, CompatibilityStatus::Unsupported { reason });
        report.schema_path = Some(resolved.path.clone());
        report
    };

    let schema = serde_json::from_str::<Value>(&resolved.text);
    let example = schema
        .as_ref()
        .ok()
        .and_then(|schema| yaml::value_to_yaml(&schema::example(schema)).ok());

    let document = match yaml::value_from_yaml(text) {
        Ok(document) => document,
        Err(e) => {
            let mut report = CompatibilityReport::new(target, CompatibilityStatus::Incompatible)
                .with_issues(IssueSource::Yaml, vec![e.to_string()]);
            report.schema_path = Some(resolved.path.clone());
            report.example = example;
            return report;
        }
    };

    let schema = match schema {
        Ok(schema) => schema,
        Err(e) => {
            warn!(path = %resolved.path, error = %e, "release schema is not valid JSON");
            return unsupported(format!("schema is not valid JSON: {e}"));
        }
    };

    let validator = match Validator::compile(&schema) {
        Ok(validator) => validator,
        Err(e @ SchemaError::Unsupported { .. }) => {
            info!(path = %resolved.path, error = %e, "schema can't be checked automatically");
            let mut report = unsupported(e.to_string());
            report.example = example;
            return report;
        }
        Err(e @ SchemaError::Invalid { .. }) => {
            warn!(path = %resolved.path, error = %e, "release schema is malformed");
            let mut report = unsupported(e.to_string());
            report.example = example;
            return report;
        }
    };

    let issues: Vec<String> = validator
        .validate(&document)
        .iter()
        .map(ToString::to_string)
        .collect();
    let mut report = if issues.is_empty() {
        CompatibilityReport::new(target, CompatibilityStatus::Compatible)
    } else {
        CompatibilityReport::new(target, CompatibilityStatus::Incompatible)
            .with_issues(IssueSource::Schema, issues)
    };
    report.schema_path = Some(resolved.path.clone());
    report.example = example;
    report
}

// ── Versions ──

fn parse_version(tag: &str) -> Option<[u64; 3]> {
    let tag = tag.strip_prefix('v').unwrap_or(tag);
    let mut parts = tag.split('.').map(|p| p.parse::<u64>().ok());
    let version = [parts.next()??, parts.next()??, parts.next()??];
    parts.next().is_none().then_some(version)
}

/// Compare release tags as `vMAJOR.MINOR.PATCH` (the `v` is optional).
///
/// Tags that don't have exactly three numeric parts compare equal to
/// anything, so this is not a total order.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => Ordering::Equal,
    }
}

/// Whether moving from `current` to `target` goes back in time.
pub fn is_rollback(current: &str, target: &str) -> bool {
    compare_versions(target, current) == Ordering::Less
}

/// The template release the site is on, and the newest one published.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub current: String,
    pub latest: String,
    pub update_available: bool,

    /// The user chose to ignore `latest`.
    pub dismissed: bool,
}

/// Compare the pinned release with the template's latest release.
pub fn update_status<S: DocumentStore>(
    store: &S,
    source: &SchemaSource,
    deploy: &DeployTarget,
    preferences: &Preferences,
) -> Result<UpdateStatus> {
    let current = store.pinned_action_ref(&deploy.workflow, &deploy.branch, &deploy.slugs)?;
    let latest = store.latest_release(&source.template_repo)?;
    let update_available = compare_versions(&latest, &current) == Ordering::Greater;
    Ok(UpdateStatus {
        dismissed: preferences.is_dismissed(&latest),
        current,
        latest,
        update_available,
    })
}

/// What a template switch did.
#[derive(Debug, Clone)]
pub struct SwitchOutcome {
    pub from: String,
    pub to: String,
    pub rollback: bool,
    pub commit: CommitInfo,
    pub report: CompatibilityReport,
}

/// Point the deploy workflow at another template release.
///
/// The document is re-checked first and the switch is refused unless the
/// check passes (or the schema is unsupported and `force` is set). The
/// deploy gate is then checked, and the workflow's pinned action reference
/// is rewritten, which commits and triggers a redeploy.
pub fn switch_version<S: DocumentStore>(
    store: &S,
    source: &SchemaSource,
    deploy: &DeployTarget,
    target: &str,
    document: &Document,
    force: bool,
) -> Result<SwitchOutcome> {
    let report = check(store, source, target, document)?;
    if !report.allows_switch(force) {
        return Err(CompatError::Blocked {
            target: target.to_string(),
            report: Box::new(report),
        });
    }

    let status = store.workflow_status(&deploy.workflow, &deploy.branch)?;
    if status.is_running {
        warn!(%target, "template switch refused, deploy in progress");
        return Err(CompatError::BuildInProgress(Box::new(status)));
    }

    let from = store.pinned_action_ref(&deploy.workflow, &deploy.branch, &deploy.slugs)?;
    let rollback = is_rollback(&from, target);
    let verb = if rollback { "Roll back" } else { "Update" };
    let message = format!("{verb} template from {from} to {target}");
    let written = store.update_workflow_action(
        &deploy.workflow,
        &deploy.branch,
        &deploy.slugs,
        target,
        &message,
    )?;
    info!(%from, to = %target, commit = %written.commit.sha, "switched template release");

    Ok(SwitchOutcome {
        from,
        to: target.to_string(),
        rollback,
        commit: written.commit,
        report,
    })
}

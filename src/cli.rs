//! CLI interface for awesome.
//!
//! Each subcommand is non-interactive: arguments in, output out. Documents
//! and reports go to stdout; progress and warnings go to stderr.
//!
//! Commands split into three groups:
//!
//! - `show`, `status`, `elements`, `workflow`, `history`: read the list.
//! - `set`, `apply`, `element`, `discard`, `push`: stage and publish edits.
//! - `version ...`: check and switch the template release.

mod format;

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::compat;
use crate::config::Config;
use crate::diff;
use crate::github::{DocumentStore, GitHubClient};
use crate::model::{AwesomeList, Document, Overlay};
use crate::session::{ListSession, SessionError};
use crate::storage::{Marker, Preferences, Storage, TagFilter, TagOperator};
use crate::token::{self, TOKEN_REQUIRED};
use crate::yaml;

use format::{
    format_commit, format_element, format_element_change, format_report, format_source,
    format_update, format_workflow_status,
};

/// Awesome: edit and publish an awesome list from the command line.
#[derive(Debug, Parser)]
#[command(name = "awesome", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Repository owner. Overrides `owner` in the config file.
    #[arg(long, global = true)]
    owner: Option<String>,

    /// Repository name, or `owner/repo`. Overrides `repo` in the config file.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Branch holding the list. Overrides `branch` in the config file.
    #[arg(long, global = true)]
    branch: Option<String>,

    /// GitHub token. Falls back to AWESOME_GITHUB_TOKEN, GITHUB_TOKEN, then the config file.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: editing the list
  1. awesome status
  2. awesome set title '"Awesome Rust"'
     awesome element set tokio description '"Async runtime"'
  3. awesome status          # review staged changes
  4. awesome push -m "Describe tokio"

Template releases:
  awesome version status
  awesome version check v2.0.0
  awesome version recheck v2.0.0 edited.yml
  awesome version switch v2.0.0"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the list as YAML, with staged edits applied.
    Show {
        /// Print the published list instead.
        #[arg(long)]
        base: bool,

        /// Print JSON instead of YAML. Includes the readme.
        #[arg(long)]
        json: bool,
    },

    /// Where the list came from, what is staged, and whether a deploy is running.
    Status,

    /// Stage a new value for one top-level field.
    ///
    /// The value is parsed as YAML, so `'"text"'`, `42`, and `[a, b]` all work.
    Set {
        key: String,
        value: String,
    },

    /// Stage every top-level field of a YAML file.
    Apply {
        file: PathBuf,
    },

    /// Stage edits to a single element.
    Element {
        #[command(subcommand)]
        command: ElementCommand,
    },

    /// Drop every staged edit.
    Discard,

    /// Commit the staged list to the repository.
    ///
    /// Refused while a deploy is queued or running.
    Push {
        /// Commit message.
        #[arg(long, short, default_value = "Update awesome list")]
        message: String,
    },

    /// Show the deploy workflow status.
    Workflow,

    /// List commits on the branch since a revision.
    History {
        /// Revision to list from. Without it, only the latest commit is shown.
        #[arg(long)]
        since: Option<String>,
    },

    /// List elements, filtered by the saved search and tag filter.
    Elements {
        /// Search text, overriding the saved one for this listing.
        #[arg(long)]
        search: Option<String>,

        /// Tag to filter by. Can be specified multiple times.
        #[arg(long)]
        tag: Vec<String>,

        /// How multiple tags combine.
        #[arg(long, value_enum)]
        operator: Option<TagOperator>,

        /// Include hidden elements.
        #[arg(long)]
        all: bool,
    },

    /// View and change saved preferences.
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },

    /// Check and switch the template release the site is built with.
    Version {
        #[command(subcommand)]
        command: VersionCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ElementCommand {
    /// Set one field of an element found by id or name.
    Set {
        key: String,
        field: String,
        /// Parsed as YAML.
        value: String,
    },

    /// Remove an element found by id or name.
    Remove { key: String },
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// Print preferences as JSON.
    Show,

    /// Allow or forbid editing commands.
    Editing {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Save the search text. Empty clears it.
    Search { text: Option<String> },

    /// Save the tag filter. No tags clears it.
    Filter {
        tags: Vec<String>,

        #[arg(long, value_enum, default_value = "and")]
        operator: TagOperator,
    },

    /// Mark elements carrying a tag.
    Mark {
        tag: String,
        #[arg(value_enum)]
        marker: Marker,
    },

    /// Remove the marker for a tag.
    Unmark { tag: String },
}

#[derive(Debug, Subcommand)]
pub enum VersionCommand {
    /// Show the pinned release and whether a newer one exists.
    Status,

    /// Stop announcing a release. Defaults to the latest.
    Dismiss { tag: Option<String> },

    /// Check the list, with staged edits, against a release's schema.
    Check {
        tag: String,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Print an example document the schema accepts.
        #[arg(long)]
        example: bool,
    },

    /// Check an edited YAML file against a release's schema.
    Recheck {
        tag: String,
        file: PathBuf,

        /// Stage the file when it passes.
        #[arg(long)]
        stage: bool,
    },

    /// Point the deploy workflow at a release, triggering a redeploy.
    ///
    /// The list is checked first and the switch is refused unless it passes.
    Switch {
        tag: String,

        /// Switch even though the schema can't be checked automatically.
        #[arg(long)]
        force: bool,
    },

    /// Compare two release tags.
    Compare { a: String, b: String },
}

/// Everything commands need, resolved once.
struct Context {
    config: Config,
    storage: Storage,
    token: Option<String>,
}

impl Context {
    fn client(&self) -> Result<GitHubClient, String> {
        Ok(GitHubClient::new(self.config.repo_ref()?, self.token.clone()))
    }

    fn open(&self) -> Result<ListSession<GitHubClient>, String> {
        ListSession::open(
            self.client()?,
            self.config.session_config(),
            &self.storage,
            self.config.load_fallback(),
        )
        .map_err(|e| format!("failed to load list: {e}"))
    }

    fn preferences(&self) -> Result<Preferences, String> {
        self.storage
            .load_preferences(&self.config.repo_ref()?)
            .map_err(|e| format!("failed to load preferences: {e}"))
    }

    fn save_preferences(&self, preferences: &Preferences) -> Result<(), String> {
        self.storage
            .save_preferences(&self.config.repo_ref()?, preferences)
            .map_err(|e| format!("failed to save preferences: {e}"))
    }

    fn require_editing(&self) -> Result<(), String> {
        if self.preferences()?.editing {
            Ok(())
        } else {
            Err("editing is disabled; enable it with `awesome prefs editing true`".to_string())
        }
    }

    fn require_token(&self) -> Result<(), String> {
        match self.token {
            Some(_) => Ok(()),
            None => Err(TOKEN_REQUIRED.to_string()),
        }
    }
}

/// Run the CLI, returning an error message on failure.
pub fn run(cli: Cli, mut config: Config, storage: Storage) -> Result<(), String> {
    if let Some(owner) = cli.owner {
        config.owner = owner;
    }
    if let Some(repo) = cli.repo {
        config.repo = repo;
    }
    if let Some(branch) = cli.branch {
        config.branch = branch;
    }
    let token = token::resolve_token(cli.token.as_deref(), config.token.as_deref());
    let ctx = Context {
        config,
        storage,
        token,
    };

    match cli.command {
        Command::Show { base, json } => cmd_show(&ctx, base, json),
        Command::Status => cmd_status(&ctx),
        Command::Set { key, value } => cmd_set(&ctx, &key, &value),
        Command::Apply { file } => cmd_apply(&ctx, &file),
        Command::Element { command } => cmd_element(&ctx, command),
        Command::Discard => cmd_discard(&ctx),
        Command::Push { message } => cmd_push(&ctx, &message),
        Command::Workflow => cmd_workflow(&ctx),
        Command::History { since } => cmd_history(&ctx, since.as_deref()),
        Command::Elements {
            search,
            tag,
            operator,
            all,
        } => cmd_elements(&ctx, search, tag, operator, all),
        Command::Prefs { command } => cmd_prefs(&ctx, command),
        Command::Version { command } => cmd_version(&ctx, command),
    }
}

fn cmd_show(ctx: &Context, base: bool, json: bool) -> Result<(), String> {
    let session = ctx.open()?;
    let content = session.content();
    let document = if base { content.old } else { content.new };

    let out = if json {
        serde_json::to_string_pretty(&document)
            .map_err(|e| format!("failed to serialize list: {e}"))?
    } else {
        yaml::to_yaml(&document).map_err(|e| format!("failed to serialize list: {e}"))?
    };
    print!("{out}");
    if json {
        println!();
    }
    Ok(())
}

fn cmd_status(ctx: &Context) -> Result<(), String> {
    let session = ctx.open()?;
    println!("Source: {}", format_source(session.source()));
    if !session.is_writable() {
        println!("Read-only: edits can't be staged until the repository is reachable");
        return Ok(());
    }

    if let Some(revision) = session.revision() {
        println!("Edits staged against: {revision}");
    }
    let changed = session.changed_keys();
    if session.overlay().is_empty() {
        println!("No unsaved changes");
    } else if changed.is_empty() {
        println!("Staged fields match the published list");
    } else {
        if let Ok(Some(at)) = session.staged_at() {
            println!("Staged at: {at}");
        }
        println!("Unsaved changes: {}", changed.join(", "));
        let content = session.content();
        if changed.contains(&"elements") {
            let old = elements(&content.old);
            let new = elements(&content.new);
            for change in diff::element_changes(old, new) {
                println!("  {}", format_element_change(&change));
            }
        }
    }

    match session.workflow_status() {
        Ok(status) => println!("Deploy: {}", format_workflow_status(&status)),
        Err(e) => eprintln!("Could not read deploy status: {e}"),
    }
    Ok(())
}

fn cmd_set(ctx: &Context, key: &str, value: &str) -> Result<(), String> {
    ctx.require_editing()?;
    let value = yaml::value_from_yaml(value).map_err(|e| format!("invalid value: {e}"))?;
    let mut session = ctx.open()?;

    let mut partial = Overlay::new();
    partial.set(key, value);
    session.update_list(partial).map_err(stage_error)?;

    eprintln!("Staged {key}");
    Ok(())
}

fn cmd_apply(ctx: &Context, file: &Path) -> Result<(), String> {
    ctx.require_editing()?;
    let text = fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
    let document = yaml::from_yaml(&text).map_err(|e| format!("{}: {e}", file.display()))?;
    stage_document(ctx, document)
}

fn stage_document(ctx: &Context, document: Document) -> Result<(), String> {
    let mut session = ctx.open()?;
    session
        .update_list(Overlay::from(document))
        .map_err(stage_error)?;

    let changed = session.changed_keys();
    if changed.is_empty() {
        eprintln!("Staged, no differences from the published list");
    } else {
        eprintln!("Staged changes to {}", changed.join(", "));
    }
    Ok(())
}

fn cmd_element(ctx: &Context, command: ElementCommand) -> Result<(), String> {
    ctx.require_editing()?;
    let mut session = ctx.open()?;
    match command {
        ElementCommand::Set { key, field, value } => {
            let value = yaml::value_from_yaml(&value).map_err(|e| format!("invalid value: {e}"))?;
            let mut fields = Document::new();
            fields.insert(field.clone(), value);
            if !session.update_element(&key, fields).map_err(stage_error)? {
                return Err(format!("no element with id or name '{key}'"));
            }
            eprintln!("Staged {key}.{field}");
        }
        ElementCommand::Remove { key } => {
            if !session.remove_element(&key).map_err(stage_error)? {
                return Err(format!("no element with id or name '{key}'"));
            }
            eprintln!("Staged removal of {key}");
        }
    }
    Ok(())
}

fn cmd_discard(ctx: &Context) -> Result<(), String> {
    let mut session = ctx.open()?;
    let had_changes = session.has_unsaved_changes();
    session
        .clear_changes()
        .map_err(|e| format!("failed to discard changes: {e}"))?;
    if had_changes {
        eprintln!("Discarded staged changes");
    } else {
        eprintln!("Nothing to discard");
    }
    Ok(())
}

fn cmd_push(ctx: &Context, message: &str) -> Result<(), String> {
    ctx.require_editing()?;
    ctx.require_token()?;
    let mut session = ctx.open()?;

    let outcome = session.push(message).map_err(|e| match e {
        SessionError::NothingToPush => e.to_string(),
        e => format!("push failed: {e}"),
    })?;

    for violation in &outcome.violations {
        eprintln!("Warning: {violation}");
    }
    if let Some(commit) = &outcome.readme_commit
        && commit.sha != outcome.commit.sha
    {
        eprintln!("Readme committed ({})", commit.short_sha());
    }
    eprintln!("Pushed ({})", outcome.commit.short_sha());
    if let Some(url) = &outcome.commit.html_url {
        eprintln!("{url}");
    }
    Ok(())
}

fn cmd_workflow(ctx: &Context) -> Result<(), String> {
    let client = ctx.client()?;
    let status = client
        .workflow_status(&ctx.config.workflow, &ctx.config.branch)
        .map_err(|e| format!("failed to read deploy status: {e}"))?;
    println!("{}", format_workflow_status(&status));
    Ok(())
}

fn cmd_history(ctx: &Context, since: Option<&str>) -> Result<(), String> {
    let client = ctx.client()?;
    let commits = match since {
        Some(since) => client.commits_since(&ctx.config.branch, since),
        None => client.latest_commit(&ctx.config.branch).map(|c| vec![c]),
    }
    .map_err(|e| format!("failed to list commits: {e}"))?;

    if commits.is_empty() {
        println!("No new commits");
    }
    for commit in &commits {
        println!("{}", format_commit(commit));
    }
    Ok(())
}

fn cmd_elements(
    ctx: &Context,
    search: Option<String>,
    tags: Vec<String>,
    operator: Option<TagOperator>,
    all: bool,
) -> Result<(), String> {
    let mut preferences = ctx.preferences()?;
    if let Some(search) = search {
        preferences.search = search;
    }
    if !tags.is_empty() {
        preferences.tag_filter = TagFilter {
            tags,
            operator: operator.unwrap_or_default(),
        };
    } else if let Some(operator) = operator {
        preferences.tag_filter.operator = operator;
    }

    let session = ctx.open()?;
    let list = AwesomeList::from_document(&session.content().new)
        .map_err(|e| format!("list has an unexpected shape: {e}"))?;

    let mut shown = 0;
    for element in &list.elements {
        let marker = preferences.marker_for(element);
        let visible = if all {
            preferences.tag_filter.matches(element)
        } else {
            preferences.shows(element)
        };
        if visible {
            println!("{}", format_element(element, marker));
            shown += 1;
        }
    }
    eprintln!("{shown} of {} elements", list.elements.len());
    Ok(())
}

fn cmd_prefs(ctx: &Context, command: PrefsCommand) -> Result<(), String> {
    let mut preferences = ctx.preferences()?;
    match command {
        PrefsCommand::Show => {
            let json = serde_json::to_string_pretty(&preferences)
                .map_err(|e| format!("failed to serialize preferences: {e}"))?;
            println!("{json}");
            return Ok(());
        }
        PrefsCommand::Editing { enabled } => preferences.editing = enabled,
        PrefsCommand::Search { text } => preferences.search = text.unwrap_or_default(),
        PrefsCommand::Filter { tags, operator } => {
            preferences.tag_filter = TagFilter { tags, operator };
        }
        PrefsCommand::Mark { tag, marker } => {
            preferences.markers.insert(tag, marker);
        }
        PrefsCommand::Unmark { tag } => {
            if preferences.markers.remove(&tag).is_none() {
                return Err(format!("no marker for tag '{tag}'"));
            }
        }
    }
    ctx.save_preferences(&preferences)?;
    eprintln!("Preferences saved");
    Ok(())
}

fn cmd_version(ctx: &Context, command: VersionCommand) -> Result<(), String> {
    let source = ctx.config.schema_source()?;
    let deploy = ctx.config.deploy_target();

    match command {
        VersionCommand::Status => {
            let client = ctx.client()?;
            let status = compat::update_status(&client, &source, &deploy, &ctx.preferences()?)
                .map_err(|e| format!("failed to read template release: {e}"))?;
            println!("{}", format_update(&status));
        }
        VersionCommand::Dismiss { tag } => {
            let tag = match tag {
                Some(tag) => tag,
                None => ctx
                    .client()?
                    .latest_release(&source.template_repo)
                    .map_err(|e| format!("failed to read latest release: {e}"))?,
            };
            let mut preferences = ctx.preferences()?;
            preferences.dismissed_update = Some(tag.clone());
            ctx.save_preferences(&preferences)?;
            eprintln!("Dismissed {tag}");
        }
        VersionCommand::Check { tag, json, example } => {
            let session = ctx.open()?;
            let report = compat::check(session.store(), &source, &tag, &session.content().new)
                .map_err(|e| format!("compatibility check failed: {e}"))?;
            if json {
                let out = serde_json::to_string_pretty(&report)
                    .map_err(|e| format!("failed to serialize report: {e}"))?;
                println!("{out}");
            } else {
                println!("{}", format_report(&report));
                if example && let Some(skeleton) = &report.example {
                    println!("\nexample:\n{skeleton}");
                }
            }
        }
        VersionCommand::Recheck { tag, file, stage } => {
            if stage {
                ctx.require_editing()?;
            }
            let text = fs::read_to_string(&file)
                .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
            let client = ctx.client()?;
            let report = compat::check_text(&client, &source, &tag, &text)
                .map_err(|e| format!("compatibility check failed: {e}"))?;
            println!("{}", format_report(&report));

            if stage && report.is_compatible() {
                let document = yaml::from_yaml(&text).map_err(|e| format!("{}: {e}", file.display()))?;
                stage_document(ctx, document)?;
            } else if stage {
                return Err("not staged: the file does not pass the check".to_string());
            }
        }
        VersionCommand::Switch { tag, force } => {
            ctx.require_token()?;
            let session = ctx.open()?;
            if session.has_unsaved_changes() {
                return Err(
                    "push or discard staged changes before switching templates".to_string(),
                );
            }
            let outcome = compat::switch_version(
                session.store(),
                &source,
                &deploy,
                &tag,
                &session.content().new,
                force,
            )
            .map_err(|e| format!("switch refused: {e}"))?;

            if matches!(
                outcome.report.status,
                compat::CompatibilityStatus::Unsupported { .. }
            ) {
                eprintln!("Warning: {}", outcome.report.summary());
            }
            let verb = if outcome.rollback { "Rolled back" } else { "Switched" };
            eprintln!(
                "{verb} {} -> {} ({})",
                outcome.from,
                outcome.to,
                outcome.commit.short_sha()
            );
        }
        VersionCommand::Compare { a, b } => {
            let symbol = match compat::compare_versions(&a, &b) {
                Ordering::Less => "<",
                Ordering::Equal => "=",
                Ordering::Greater => ">",
            };
            println!("{a} {symbol} {b}");
        }
    }
    Ok(())
}

fn stage_error(e: SessionError) -> String {
    format!("could not stage change: {e}")
}

fn elements(document: &Document) -> &[Value] {
    document
        .get("elements")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

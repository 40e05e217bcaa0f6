//! Core data model for awesome.
//!
//! These types represent the published list document, the locally staged
//! overlay of edits, and what the git host reports about the repository:
//! revisions, files, and deploy workflow runs.

mod list;
mod overlay;
mod remote;

pub use list::{AwesomeList, Document, Element, Violation, find_element, is_url};
pub use overlay::Overlay;
pub use remote::{CommitInfo, FileWrite, RemoteFile, RepoRef, WorkflowRun, WorkflowRunStatus, WrittenFile};

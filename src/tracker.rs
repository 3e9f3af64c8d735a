//! The tracker boundary: everything Cadence needs from the issue/PR/content
//! hosting system, behind one trait.
//!
//! The shipped implementation drives the `gh` CLI (see [`gh`]); tests use an
//! in-memory fake. Operators and the stage engine only see this trait, which
//! keeps them deterministic against a snapshot of tracker state.

pub mod gh;

use thiserror::Error;

use crate::model::{AgentEvent, Comment, Issue, MergeAttempt, PullRequest};

/// Errors crossing the tracker boundary.
///
/// Everything here is treated as transient by operators: the caller
/// (a timer or a human) owns the retry.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("unexpected response from {context}: {source}")]
    Decode {
        context: &'static str,
        source: serde_json::Error,
    },

    #[error("{0}")]
    Unexpected(String),
}

pub type Result<T> = core::result::Result<T, TrackerError>;

/// A text file fetched through the contents API.
///
/// `sha` is the blob hash the tracker requires for optimistic updates
/// and deletes.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub text: String,
    pub sha: String,
}

/// The operations Cadence consumes from the tracking system.
///
/// Mutating calls are expected to give read-your-own-writes consistency;
/// search may lag, which is why promotion pairs it with marker checks.
pub trait Tracker: Send + Sync {
    /// The repository this tracker is bound to, as `owner/repo`.
    fn repository(&self) -> &str;

    // ── Issues ──

    fn list_open_issues(&self) -> Result<Vec<Issue>>;

    fn get_issue(&self, number: u64) -> Result<Issue>;

    fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<Issue>;

    fn update_issue_body(&self, number: u64, body: &str) -> Result<()>;

    /// Assign users/bots; returns the assignees the tracker reports after
    /// the attempt (the API can accept a request without persisting it).
    fn assign_issue(&self, number: u64, assignees: &[String]) -> Result<Vec<String>>;

    /// Create the label if it does not exist. Idempotent.
    fn ensure_label(&self, name: &str, color: &str, description: &str) -> Result<()>;

    /// Search open issues whose body contains the marker; lowest number
    /// wins for determinism.
    fn find_issue_by_marker(&self, marker: &str) -> Result<Option<u64>>;

    // ── Pull requests ──

    /// PRs cross-referenced or connected on the issue's timeline.
    /// Derived fresh from the live timeline on every call.
    fn linked_pull_requests(&self, issue_number: u64) -> Result<Vec<PullRequest>>;

    fn get_pull_request(&self, number: u64) -> Result<PullRequest>;

    /// Whether a review has been requested on the PR, now or at any point
    /// in its history.
    fn review_requested(&self, number: u64) -> Result<bool>;

    fn approve_pull_request(&self, number: u64) -> Result<()>;

    /// Convert a draft to ready-for-review and return the refreshed PR.
    fn mark_ready_for_review(&self, number: u64) -> Result<PullRequest>;

    /// Attempt the merge. A tracker refusal (checks, approvals) is a
    /// non-merged [`MergeAttempt`], not an error.
    fn merge_pull_request(&self, number: u64) -> Result<MergeAttempt>;

    fn delete_branch(&self, repo: &str, branch: &str) -> Result<()>;

    // ── Repository contents ──

    /// File names directly under `dir` (empty when the directory is absent).
    fn list_dir(&self, dir: &str) -> Result<Vec<String>>;

    fn get_file(&self, path: &str) -> Result<Option<FileContent>>;

    fn put_file(&self, path: &str, content: &str, message: &str, sha: Option<&str>) -> Result<()>;

    fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<()>;

    // ── Conversation ──

    fn post_comment(&self, number: u64, body: &str) -> Result<()>;

    fn list_comments(&self, number: u64) -> Result<Vec<Comment>>;

    /// Coding-agent lifecycle events from the PR timeline, oldest first.
    fn agent_events(&self, pr_number: u64) -> Result<Vec<AgentEvent>>;
}

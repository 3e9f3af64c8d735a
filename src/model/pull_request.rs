//! Pull request types, plus the agent events observed on a PR's timeline.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A pull request as seen on the tracker.
///
/// Transient: created by the coding agent, terminated by merge or close.
/// `mergeable` is `None` while the tracker is still computing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
    pub is_draft: bool,
    pub merged: bool,
    pub mergeable: Option<bool>,
    pub mergeable_state: Option<String>,
    pub head_ref: String,
    pub head_repo: String,
    pub base_ref: String,
}

impl PullRequest {
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }

    /// Conflicted against the base branch.
    pub fn is_conflicted(&self) -> bool {
        self.mergeable_state.as_deref() == Some("dirty")
    }
}

/// Outcome of a merge attempt.
///
/// The tracker refuses merges for unmet required checks or missing
/// approvals; that refusal is data, not an error.
#[derive(Debug, Clone)]
pub struct MergeAttempt {
    pub merged: bool,
    pub message: String,
}

/// A coding-agent lifecycle event observed on a pull request timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: AgentEventKind,
    pub at: Timestamp,
}

/// What the agent did, as far as the timeline shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    Started,
    Succeeded,
    Stopped,
    Failed,
}

impl AgentEventKind {
    /// Events that indicate the agent is (or ended up) in good shape.
    pub fn is_progress(self) -> bool {
        matches!(self, Self::Started | Self::Succeeded)
    }

    /// Events that indicate the agent gave up before finishing.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

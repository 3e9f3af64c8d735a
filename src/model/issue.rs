//! Issue types: tracker-owned records the workflow advances through.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// An issue as seen on the tracker.
///
/// Cadence never deletes issues; it only creates, assigns, repairs,
/// or observes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub state: IssueState,
}

impl Issue {
    /// Whether the issue carries the given label (exact match).
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }

    /// Whether the given login is already assigned.
    pub fn is_assigned_to(&self, login: &str) -> bool {
        self.assignees.iter().any(|a| a == login)
    }
}

/// Open or closed. The tracker owns the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// A top-level comment on an issue or pull request conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: Timestamp,
}

//! Monitor job records: the persisted face of a background PR monitor.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// One background monitor's state, persisted every poll tick so an
/// external observer never sees a monitor "disappear".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorJob {
    pub id: String,
    pub issue_number: u64,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Terminal outcome; `None` while the monitor is still polling.
    #[serde(default)]
    pub completion: Option<Completion>,

    /// The linked PR numbers seen on the most recent poll.
    #[serde(default)]
    pub pull_request_numbers: Vec<u64>,

    #[serde(default)]
    pub error: Option<String>,
}

/// Lifecycle of a monitor job. Mutated only by the owning task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

/// How the wait for linked pull requests ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// All linked PRs terminal and merged. The only success.
    Merged,

    /// No open PRs remain, but at least one closed without merging.
    Closed,

    /// The configured timeout elapsed first.
    Timeout,

    /// No PR ever appeared and the caller did not require one.
    NoPr,
}

impl Completion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::Timeout => "timeout",
            Self::NoPr => "no_pr",
        }
    }
}

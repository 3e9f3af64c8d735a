//! Core data model for Cadence.
//!
//! These types represent the workflow's vocabulary: work items queued as
//! files in the tracked repository, the issues and pull requests they map
//! to, the nine-stage pipeline position, and the structured results that
//! operators and background monitors report.

mod issue;
mod job;
mod pull_request;
mod report;
mod stage;
mod work_item;

pub use issue::{Comment, Issue, IssueState};
pub use job::{Completion, JobStatus, MonitorJob};
pub use pull_request::{AgentEvent, AgentEventKind, MergeAttempt, PullRequest};
pub use report::{StepOutcome, StepReport};
pub use stage::{Focus, Operator, Phase, Stage, StageReport, SubStage};
pub use work_item::{extract_work_item_id, QueueLocation, WorkItem};

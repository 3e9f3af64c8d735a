//! Structured operator results.
//!
//! Every operator call returns a report that distinguishes "nothing to do"
//! from "refused for safety" from "done", so a driver can apply different
//! backoff policies to each. Transient tracker failures are `Err`, not a
//! report variant.

use serde::{Deserialize, Serialize};

/// What an operator invocation accomplished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum StepOutcome {
    /// The main mutation happened, or had already happened; idempotent
    /// re-runs report the same completion.
    Completed {
        summary: String,
        issue_number: Option<u64>,
        pr_number: Option<u64>,
    },

    /// Nothing to act on yet. Not an error.
    Idle { reason: String },

    /// A safety gate refused the action. Never auto-retried by the
    /// operator itself.
    Blocked { reason: String },
}

/// An operator result plus any best-effort side steps that failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub outcome: StepOutcome,

    /// Failures of secondary effects (approval, branch delete, comment).
    /// These never abort the primary action.
    pub warnings: Vec<String>,
}

impl StepReport {
    pub fn completed(summary: impl Into<String>) -> Self {
        Self {
            outcome: StepOutcome::Completed {
                summary: summary.into(),
                issue_number: None,
                pr_number: None,
            },
            warnings: Vec::new(),
        }
    }

    pub fn idle(reason: impl Into<String>) -> Self {
        Self {
            outcome: StepOutcome::Idle {
                reason: reason.into(),
            },
            warnings: Vec::new(),
        }
    }

    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            outcome: StepOutcome::Blocked {
                reason: reason.into(),
            },
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_issue(mut self, number: u64) -> Self {
        if let StepOutcome::Completed { issue_number, .. } = &mut self.outcome {
            *issue_number = Some(number);
        }
        self
    }

    #[must_use]
    pub fn with_pr(mut self, number: u64) -> Self {
        if let StepOutcome::Completed { pr_number, .. } = &mut self.outcome {
            *pr_number = Some(number);
        }
        self
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// The issue number this step settled on, if any.
    pub fn issue_number(&self) -> Option<u64> {
        match &self.outcome {
            StepOutcome::Completed { issue_number, .. } => *issue_number,
            _ => None,
        }
    }
}

//! Merge-readiness evaluation: classify a pull request against the safety
//! gates, without touching the tracker.
//!
//! Two tiers exist because reporting progress must not flip draft PRs to
//! ready (reads stay side-effect-free), while the merge operator is allowed
//! to perform that flip as one step of its own action.

use crate::model::PullRequest;

/// How a pull request classifies against the merge gates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Hard-stopped: closed, work-in-progress, or conflicted.
    Blocked(String),

    /// Eligible for the merge operator. May still be a draft; the
    /// operator flips it as part of merging.
    MergeCandidate,

    /// A merge candidate that is also not a draft. Used for stage display.
    ReadyForReview,
}

impl Readiness {
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::MergeCandidate | Self::ReadyForReview)
    }
}

/// Classify a pull request. `review_requested` is computed by the caller
/// (current reviewer request or a historical request event).
pub fn evaluate(pr: &PullRequest, review_requested: bool) -> Readiness {
    if !pr.is_open() {
        return Readiness::Blocked(format!("pull request is not open (state={})", pr.state));
    }
    if is_wip_title(&pr.title) {
        return Readiness::Blocked("title is marked work-in-progress".to_string());
    }
    if pr.is_conflicted() {
        return Readiness::Blocked("merge conflicts against the base branch".to_string());
    }
    if pr.mergeable == Some(false) {
        return Readiness::Blocked("tracker reports the pull request as unmergeable".to_string());
    }
    if !review_requested {
        return Readiness::Blocked("no review has been requested".to_string());
    }

    if pr.is_draft {
        Readiness::MergeCandidate
    } else {
        Readiness::ReadyForReview
    }
}

/// Whether a title carries a work-in-progress marker.
///
/// Case-insensitive `wip` prefix token, optionally bracketed: `WIP: x`,
/// `[wip] x`, `wip x`. A word merely starting with "wip" does not count.
pub fn is_wip_title(title: &str) -> bool {
    let trimmed = title.trim_start();
    let candidate = trimmed
        .strip_prefix('[')
        .map_or(trimmed, str::trim_start);

    let lower = candidate.to_lowercase();
    if !lower.starts_with("wip") {
        return false;
    }
    match candidate[3..].chars().next() {
        None => true,
        Some(c) => c == ':' || c == ']' || c.is_whitespace() || c == '-',
    }
}

//! Merge the next ready pull request, with hard safety gates.

use tracing::{info, warn};

use crate::config::Config;
use crate::model::{extract_work_item_id, Phase, QueueLocation, StepReport};
use crate::readiness;
use crate::stage::{self, MergeTarget, CAPABILITY_LABEL};
use crate::tracker::{Result, Tracker};

/// Follow-up capability issues are deduplicated by this marker, keyed on
/// the merged PR number.
pub const SOURCE_PR_MARKER_PREFIX: &str = "cadence-source-pr:";

pub const CAPABILITY_FOLLOW_UP_PREFIX: &str = "Update system capabilities based on merged PR";

/// Head branches never deleted, whoever owns them.
const PROTECTED_BRANCHES: &[&str] = &["main", "master"];

pub fn run(tracker: &dyn Tracker, config: &Config) -> Result<StepReport> {
    let resolution = stage::resolve(tracker, config)?;
    match resolution.target {
        Some(target) => merge_target(tracker, config, &target),
        None => Ok(StepReport::idle("no merge candidate")),
    }
}

/// Merge one selected candidate. Gates are re-checked against a fresh PR
/// record; selection may be stale by the time we act.
pub(crate) fn merge_target(
    tracker: &dyn Tracker,
    config: &Config,
    target: &MergeTarget,
) -> Result<StepReport> {
    let mut pr = tracker.get_pull_request(target.pr.number)?;

    if pr.merged {
        return Ok(StepReport::completed(format!("PR #{} already merged", pr.number))
            .with_issue(target.issue.number)
            .with_pr(pr.number));
    }
    if !pr.is_open() {
        return Ok(StepReport::idle(format!(
            "PR #{} closed without merge",
            pr.number
        )));
    }

    // Hard safety gates. These are refusals, not retryable conditions.
    if readiness::is_wip_title(&pr.title) {
        return Ok(StepReport::blocked(format!(
            "PR #{} is marked work-in-progress: {}",
            pr.number, pr.title
        )));
    }
    if !tracker.review_requested(pr.number)? {
        return Ok(StepReport::blocked(format!(
            "PR #{} has never had a review requested",
            pr.number
        )));
    }
    if pr.is_conflicted() || pr.mergeable == Some(false) {
        return Ok(StepReport::blocked(format!(
            "PR #{} is not mergeable against {}",
            pr.number, pr.base_ref
        )));
    }

    if pr.is_draft {
        pr = tracker.mark_ready_for_review(pr.number)?;
        if pr.is_draft {
            return Ok(StepReport::blocked(format!(
                "PR #{} is still a draft after mark-ready",
                pr.number
            )));
        }
    }

    let mut report = StepReport::completed(format!("merged PR #{}", pr.number))
        .with_issue(target.issue.number)
        .with_pr(pr.number);

    if let Err(e) = tracker.approve_pull_request(pr.number) {
        warn!(pr = pr.number, error = %e, "approval failed");
        report.warn(format!("could not approve PR #{}: {e}", pr.number));
    }

    let attempt = tracker.merge_pull_request(pr.number)?;
    if !attempt.merged {
        // Unmet checks or missing approvals. The next cycle retries.
        return Ok(StepReport::blocked(format!(
            "tracker refused merge of PR #{}: {}",
            pr.number, attempt.message
        )));
    }
    info!(pr = pr.number, issue = target.issue.number, "merged pull request");

    delete_head_branch(tracker, &pr, &mut report);
    complete_artifact(tracker, config, target, &mut report);

    if target.phase == Phase::Development {
        ensure_follow_up(tracker, config, pr.number, &mut report);
    }

    Ok(report)
}

/// Best-effort head-branch cleanup. Fork heads are left alone, as is
/// anything named like a default branch.
fn delete_head_branch(
    tracker: &dyn Tracker,
    pr: &crate::model::PullRequest,
    report: &mut StepReport,
) {
    if pr.head_repo != tracker.repository() {
        return;
    }
    if PROTECTED_BRANCHES.contains(&pr.head_ref.as_str()) {
        return;
    }
    if let Err(e) = tracker.delete_branch(&pr.head_repo, &pr.head_ref) {
        warn!(branch = %pr.head_ref, error = %e, "branch delete failed");
        report.warn(format!("could not delete branch {}: {e}", pr.head_ref));
    }
}

/// Move the originating work item from `processed/` to `complete/`,
/// located through the marker embedded in the issue body. Best-effort:
/// the merge already happened.
fn complete_artifact(
    tracker: &dyn Tracker,
    config: &Config,
    target: &MergeTarget,
    report: &mut StepReport,
) {
    let Some(id) = extract_work_item_id(&target.issue.body) else {
        return;
    };

    let path = config.queue_path(QueueLocation::Processed, &id);
    let artifact = match tracker.get_file(&path) {
        Ok(Some(file)) => stage::Artifact {
            id,
            text: file.text,
            sha: file.sha,
            location: QueueLocation::Processed,
        },
        Ok(None) => return,
        Err(e) => {
            report.warn(format!("could not read {path}: {e}"));
            return;
        }
    };

    if let Err(e) = super::promote::move_artifact(
        tracker,
        config,
        &artifact,
        QueueLocation::Complete,
        report,
    ) {
        warn!(path = %path, error = %e, "could not complete artifact");
        report.warn(format!("could not move {path} to complete: {e}"));
    }
}

/// Create-or-reuse the capability-update follow-up for a development merge.
fn ensure_follow_up(
    tracker: &dyn Tracker,
    config: &Config,
    pr_number: u64,
    report: &mut StepReport,
) {
    let marker = format!("{SOURCE_PR_MARKER_PREFIX} {pr_number}");

    let existing = match tracker.find_issue_by_marker(&marker) {
        Ok(existing) => existing,
        Err(e) => {
            report.warn(format!("follow-up marker search failed: {e}"));
            return;
        }
    };

    let number = match existing {
        Some(number) => number,
        None => {
            if let Err(e) = tracker.ensure_label(
                CAPABILITY_LABEL,
                "5319e7",
                "Capability notes need updating after a merge",
            ) {
                warn!(error = %e, "could not ensure capability label");
            }
            let title = format!("{CAPABILITY_FOLLOW_UP_PREFIX} #{pr_number}");
            let body = format!(
                "PR #{pr_number} merged. Review the change and update the system \
                 capability notes to match what the system can now do.\n\n\
                 <!-- {marker} -->"
            );
            match tracker.create_issue(&title, &body, &[CAPABILITY_LABEL.to_string()]) {
                Ok(issue) => {
                    info!(issue = issue.number, pr = pr_number, "created capability follow-up");
                    issue.number
                }
                Err(e) => {
                    report.warn(format!("could not create capability follow-up: {e}"));
                    return;
                }
            }
        }
    };

    if let Err(e) = tracker.assign_issue(number, std::slice::from_ref(&config.agent_login)) {
        report.warn(format!("could not assign capability follow-up #{number}: {e}"));
    }
}

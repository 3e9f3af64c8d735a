//! Promote the next pending work item into a tracked issue.

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::matcher;
use crate::model::{QueueLocation, StepReport, WorkItem};
use crate::stage::{self, Artifact, DEVELOPMENT_LABEL};
use crate::tracker::{Result, Tracker};

pub fn run(tracker: &dyn Tracker, config: &Config) -> Result<StepReport> {
    let issues = tracker.list_open_issues()?;
    let pending = stage::load_artifacts(tracker, config, QueueLocation::Pending)?;

    // The first unpromoted item wins. Matched ones are lingering copies
    // from a run whose delete failed; they are skipped here.
    if let Some(artifact) = pending
        .iter()
        .find(|a| matcher::match_work_item(&a.text, &issues).is_none())
    {
        return promote_artifact(tracker, config, artifact);
    }

    // Everything pending is already promoted; repair the oldest lingering
    // copy (fresh write of processed/, delete of pending/) and report the
    // issue it maps to.
    if let Some((artifact, issue)) = pending
        .iter()
        .find_map(|a| matcher::match_work_item(&a.text, &issues).map(|issue| (a, issue)))
    {
        debug!(id = %artifact.id, issue = issue.number, "repairing lingering pending copy");
        let mut report = StepReport::completed(format!(
            "work item {} already promoted as issue #{}",
            artifact.id, issue.number
        ))
        .with_issue(issue.number);
        move_artifact(tracker, config, artifact, QueueLocation::Processed, &mut report)?;
        return Ok(report);
    }

    // Nothing pending. If the last processed item still maps to an open
    // issue, report that completion again so re-runs stay a no-op with the
    // same issue number.
    let processed = stage::load_artifacts(tracker, config, QueueLocation::Processed)?;
    for artifact in &processed {
        if let Some(issue) = matcher::match_work_item(&artifact.text, &issues) {
            return Ok(StepReport::completed(format!(
                "work item {} already promoted as issue #{}",
                artifact.id, issue.number
            ))
            .with_issue(issue.number));
        }
    }

    Ok(StepReport::idle("no pending work items"))
}

fn promote_artifact(tracker: &dyn Tracker, config: &Config, artifact: &Artifact) -> Result<StepReport> {
    let Some(title) = matcher::derive_title(&artifact.text) else {
        return Ok(StepReport::blocked(format!(
            "work item {} has no usable title line",
            artifact.id
        )));
    };

    let item = WorkItem {
        id: artifact.id.clone(),
        title,
        body: artifact.text.clone(),
        location: QueueLocation::Pending,
    };
    let marker = item.marker();

    // Search may lag behind a racing create; the marker check is the only
    // thing standing between us and a duplicate issue.
    let issue_number = match tracker.find_issue_by_marker(&marker)? {
        Some(number) => {
            debug!(id = %item.id, issue = number, "marker matched an existing issue");
            number
        }
        None => {
            if let Err(e) =
                tracker.ensure_label(DEVELOPMENT_LABEL, "0e8a16", "Queued development work")
            {
                warn!(error = %e, "could not ensure development label");
            }
            let body = format!("{}\n\n<!-- {marker} -->", item.body.trim_end());
            let issue =
                tracker.create_issue(&item.title, &body, &[DEVELOPMENT_LABEL.to_string()])?;
            info!(id = %item.id, issue = issue.number, "promoted work item");
            issue.number
        }
    };

    let mut report = StepReport::completed(format!(
        "promoted {} to issue #{issue_number}",
        item.id
    ))
    .with_issue(issue_number);

    assign_agent(tracker, config, issue_number, &mut report);
    move_artifact(tracker, config, artifact, QueueLocation::Processed, &mut report)?;
    Ok(report)
}

fn assign_agent(tracker: &dyn Tracker, config: &Config, number: u64, report: &mut StepReport) {
    match tracker.assign_issue(number, std::slice::from_ref(&config.agent_login)) {
        Ok(assignees) if !assignees.contains(&config.agent_login) => {
            report.warn(format!(
                "assignment of {} to issue #{number} was not persisted",
                config.agent_login
            ));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(issue = number, error = %e, "failed to assign agent");
            report.warn(format!("failed to assign {}: {e}", config.agent_login));
        }
    }
}

/// Move an artifact to another queue directory: write the copy, then delete
/// the original. The substrate has no rename, and a failed delete is
/// tolerated; the next run finds both copies and repairs.
pub(crate) fn move_artifact(
    tracker: &dyn Tracker,
    config: &Config,
    artifact: &Artifact,
    to: QueueLocation,
    report: &mut StepReport,
) -> Result<()> {
    let dest = config.queue_path(to, &artifact.id);
    if tracker.get_file(&dest)?.is_none() {
        tracker.put_file(
            &dest,
            &artifact.text,
            &format!("Move {} to {}", artifact.id, to.dir_name()),
            None,
        )?;
    }

    let src = config.queue_path(artifact.location, &artifact.id);
    if let Err(e) = tracker.delete_file(
        &src,
        &artifact.sha,
        &format!("Remove {} from {}", artifact.id, artifact.location.dir_name()),
    ) {
        warn!(path = %src, error = %e, "could not delete moved artifact");
        report.warn(format!("failed to delete {src}: {e}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::StepOutcome;
    use crate::tracker::fake::FakeTracker;

    fn config() -> Config {
        toml::from_str("repository = \"octo/workflow\"").unwrap()
    }

    #[test]
    fn promotes_pending_item_end_to_end() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw(
            "planning/issue_queue/pending/dev-001.md",
            "# Add retry logic\n\nRetry transient failures in the fetch path.",
        );

        let report = run(&tracker, &config()).unwrap();
        let number = report.issue_number().unwrap();

        let issue = tracker.issue(number);
        assert_eq!(issue.title, "Add retry logic");
        assert!(issue.body.contains("cadence-work-item: dev-001.md"));
        assert!(issue.has_label(DEVELOPMENT_LABEL));
        assert!(issue.is_assigned_to("copilot-swe-agent[bot]"));

        let paths = tracker.file_paths();
        assert!(paths.contains(&"planning/issue_queue/processed/dev-001.md".to_string()));
        assert!(!paths.contains(&"planning/issue_queue/pending/dev-001.md".to_string()));
        assert_eq!(
            tracker.file_text("planning/issue_queue/processed/dev-001.md").unwrap(),
            "# Add retry logic\n\nRetry transient failures in the fetch path."
        );
    }

    #[test]
    fn repeated_run_is_a_no_op_with_the_same_issue_number() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n");

        let first = run(&tracker, &config()).unwrap();
        let second = run(&tracker, &config()).unwrap();

        assert_eq!(first.issue_number(), second.issue_number());
        assert_eq!(tracker.created_issue_count(), 1);
    }

    #[test]
    fn marker_search_short_circuits_creation() {
        let tracker = FakeTracker::new();
        let existing = tracker.add_issue(
            "Retry logic (rephrased)",
            "Body.\n\n<!-- cadence-work-item: dev-001.md -->",
            &[],
        );
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n");

        let report = run(&tracker, &config()).unwrap();
        assert_eq!(report.issue_number(), Some(existing));
        assert_eq!(tracker.created_issue_count(), 0);
    }

    #[test]
    fn lingering_pending_copy_is_repaired_not_repromoted() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Add retry logic", "body", &["Development"]);
        // A previous run wrote processed/ but failed to delete pending/.
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n");
        tracker.put_file_raw("planning/issue_queue/processed/dev-001.md", "# Add retry logic\n");

        let report = run(&tracker, &config()).unwrap();
        assert_eq!(report.issue_number(), Some(issue));
        assert_eq!(tracker.created_issue_count(), 0);
        assert!(!tracker
            .file_paths()
            .contains(&"planning/issue_queue/pending/dev-001.md".to_string()));
    }

    #[test]
    fn empty_queue_is_idle() {
        let tracker = FakeTracker::new();
        let report = run(&tracker, &config()).unwrap();
        assert!(matches!(report.outcome, StepOutcome::Idle { .. }));
    }

    #[test]
    fn blank_artifact_is_blocked() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "\n\n   \n");

        let report = run(&tracker, &config()).unwrap();
        assert!(matches!(report.outcome, StepOutcome::Blocked { .. }));
        assert_eq!(tracker.created_issue_count(), 0);
    }

    #[test]
    fn promotes_items_in_filename_order() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw("planning/issue_queue/pending/dev-002.md", "# Second item\n");
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# First item\n");

        let report = run(&tracker, &config()).unwrap();
        let issue = tracker.issue(report.issue_number().unwrap());
        assert_eq!(issue.title, "First item");
    }
}

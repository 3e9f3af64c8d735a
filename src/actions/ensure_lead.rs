//! Ensure the lead gap-analysis issue exists, is safe, and is assigned.

use tracing::{info, warn};

use crate::config::Config;
use crate::model::StepReport;
use crate::stage::{self, GAP_ANALYSIS_LABEL, LEAD_ISSUE_TITLES};
use crate::tracker::{Result, Tracker};

/// A retired template once told the agent to merge its own PR. Any lead
/// issue still carrying that instruction gets its body rewritten.
pub const UNSAFE_BODY_PHRASE: &str = "merge the pull request yourself";

const LEAD_ISSUE_TEMPLATE: &str = include_str!("../../templates/gap_analysis.md");

pub fn run(tracker: &dyn Tracker, config: &Config) -> Result<StepReport> {
    let issues = tracker.list_open_issues()?;

    if let Some(issue) = issues.iter().find(|i| stage::is_lead_issue(i)) {
        let mut report = if issue.body.contains(UNSAFE_BODY_PHRASE) {
            warn!(issue = issue.number, "lead issue body carries unsafe instruction, rewriting");
            tracker.update_issue_body(issue.number, LEAD_ISSUE_TEMPLATE)?;
            StepReport::completed("rewrote unsafe lead issue body").with_issue(issue.number)
        } else {
            StepReport::completed("lead issue already open").with_issue(issue.number)
        };
        if !issue.is_assigned_to(&config.agent_login) {
            ensure_assigned(tracker, config, issue.number, &mut report);
        }
        return Ok(report);
    }

    if let Err(e) = tracker.ensure_label(GAP_ANALYSIS_LABEL, "1d76db", "Lead gap-analysis work") {
        warn!(error = %e, "could not ensure gap-analysis label");
    }

    let issue = tracker.create_issue(
        LEAD_ISSUE_TITLES[0],
        LEAD_ISSUE_TEMPLATE,
        &[GAP_ANALYSIS_LABEL.to_string()],
    )?;
    info!(issue = issue.number, "created lead issue");

    let mut report = StepReport::completed("created lead issue").with_issue(issue.number);
    ensure_assigned(tracker, config, issue.number, &mut report);
    Ok(report)
}

/// Assign the coding agent. The assign API can accept a request without
/// persisting it, so check what the tracker reports back.
fn ensure_assigned(tracker: &dyn Tracker, config: &Config, number: u64, report: &mut StepReport) {
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

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::StepOutcome;
    use crate::tracker::fake::FakeTracker;

    fn config() -> Config {
        toml::from_str("repository = \"octo/workflow\"").unwrap()
    }

    #[test]
    fn creates_lead_issue_from_template_and_assigns_agent() {
        let tracker = FakeTracker::new();
        let report = run(&tracker, &config()).unwrap();

        let number = report.issue_number().unwrap();
        let issue = tracker.issue(number);
        assert_eq!(issue.title, "Run gap analysis");
        assert_eq!(issue.body, LEAD_ISSUE_TEMPLATE);
        assert!(issue.has_label(GAP_ANALYSIS_LABEL));
        assert!(issue.is_assigned_to("copilot-swe-agent[bot]"));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn second_run_reuses_the_open_issue() {
        let tracker = FakeTracker::new();
        let first = run(&tracker, &config()).unwrap();
        let second = run(&tracker, &config()).unwrap();

        assert_eq!(first.issue_number(), second.issue_number());
        assert_eq!(tracker.created_issue_count(), 1);
    }

    #[test]
    fn rewrites_body_containing_unsafe_phrase() {
        let tracker = FakeTracker::new();
        let number = tracker.add_issue(
            "Run gap analysis",
            "When the work is done, merge the pull request yourself.",
            &[],
        );

        let report = run(&tracker, &config()).unwrap();
        assert_eq!(report.issue_number(), Some(number));
        assert_eq!(tracker.issue(number).body, LEAD_ISSUE_TEMPLATE);
        match report.outcome {
            StepOutcome::Completed { ref summary, .. } => {
                assert!(summary.contains("unsafe"));
            }
            ref other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn leaves_a_safe_body_untouched() {
        let tracker = FakeTracker::new();
        let number = tracker.add_issue("Gap analysis", "A perfectly fine body.", &[]);

        run(&tracker, &config()).unwrap();
        assert_eq!(tracker.issue(number).body, "A perfectly fine body.");
        assert_eq!(tracker.created_issue_count(), 0);
    }
}

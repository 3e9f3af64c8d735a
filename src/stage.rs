//! Stage inference: derive the pipeline's current position from live
//! tracker state.
//!
//! Recomputed from scratch on every call. Nothing here is cached across
//! invocations; the answer is only as stale as the reads that produced it.

use tracing::debug;

use crate::config::Config;
use crate::matcher;
use crate::model::{
    Focus, Issue, Phase, PullRequest, QueueLocation, Stage, StageReport, SubStage,
};
use crate::readiness;
use crate::tracker::{Result, Tracker};

/// Canonical titles identifying the lead gap-analysis issue. Matched
/// exactly, case-insensitively; this phase is not derived from artifacts.
pub const LEAD_ISSUE_TITLES: &[&str] = &["Run gap analysis", "Gap analysis"];

pub const GAP_ANALYSIS_LABEL: &str = "Gap Analysis";
pub const DEVELOPMENT_LABEL: &str = "Development";
pub const CAPABILITY_LABEL: &str = "Update Capability";

/// Legacy capability artifacts are recognized by filename, not label.
pub const CAPABILITY_ARTIFACT_PREFIX: &str = "capability-";

pub fn is_lead_issue(issue: &Issue) -> bool {
    let title = issue.title.trim();
    LEAD_ISSUE_TITLES
        .iter()
        .any(|t| t.eq_ignore_ascii_case(title))
}

/// A queued work-item artifact, fetched from the repository contents API.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub text: String,
    pub sha: String,
    pub location: QueueLocation,
}

/// All artifacts under one queue directory, filename-sorted.
pub fn load_artifacts(
    tracker: &dyn Tracker,
    config: &Config,
    location: QueueLocation,
) -> Result<Vec<Artifact>> {
    let dir = config.queue_dir(location);
    let mut names = tracker.list_dir(&dir)?;
    names.sort();

    let mut artifacts = Vec::with_capacity(names.len());
    for id in names {
        // A file listed then deleted between calls is not our problem.
        let Some(file) = tracker.get_file(&format!("{dir}/{id}"))? else {
            continue;
        };
        artifacts.push(Artifact {
            id,
            text: file.text,
            sha: file.sha,
            location,
        });
    }
    Ok(artifacts)
}

/// The pull request the merge operator should act on, with the issue it
/// belongs to and the phase that selected it.
#[derive(Debug, Clone)]
pub struct MergeTarget {
    pub phase: Phase,
    pub issue: Issue,
    pub pr: PullRequest,
}

/// One inference pass: the stage report, plus the merge target when the
/// stage landed on `mergeReady`.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub report: StageReport,
    pub target: Option<MergeTarget>,
}

/// Infer the current stage and focus.
pub fn infer(tracker: &dyn Tracker, config: &Config) -> Result<StageReport> {
    Ok(resolve(tracker, config)?.report)
}

/// Full inference, evaluated in fixed phase-priority order: lead, then
/// capability issues, then development artifacts, then legacy capability
/// artifacts. First applicable phase wins.
pub fn resolve(tracker: &dyn Tracker, config: &Config) -> Result<Resolution> {
    let issues = tracker.list_open_issues()?;

    if let Some(issue) = issues.iter().find(|i| is_lead_issue(i)) {
        debug!(issue = issue.number, "lead issue open");
        return issue_resolution(tracker, Phase::Lead, issue);
    }

    if let Some(issue) = issues.iter().find(|i| i.has_label(CAPABILITY_LABEL)) {
        debug!(issue = issue.number, "capability issue open");
        return issue_resolution(tracker, Phase::Capability, issue);
    }

    let pending = load_artifacts(tracker, config, QueueLocation::Pending)?;
    let processed = load_artifacts(tracker, config, QueueLocation::Processed)?;

    let is_capability = |a: &&Artifact| a.id.starts_with(CAPABILITY_ARTIFACT_PREFIX);

    let dev_pending: Vec<&Artifact> = pending.iter().filter(|a| !is_capability(a)).collect();
    let dev_processed: Vec<&Artifact> = processed.iter().filter(|a| !is_capability(a)).collect();
    if !dev_pending.is_empty() || !dev_processed.is_empty() {
        return artifact_resolution(tracker, Phase::Development, &dev_pending, &dev_processed, &issues);
    }

    let cap_pending: Vec<&Artifact> = pending.iter().filter(is_capability).collect();
    let cap_processed: Vec<&Artifact> = processed.iter().filter(is_capability).collect();
    if !cap_pending.is_empty() || !cap_processed.is_empty() {
        return artifact_resolution(tracker, Phase::Capability, &cap_pending, &cap_processed, &issues);
    }

    // Idle: nothing open, nothing queued. The next move is the lead issue.
    Ok(Resolution {
        report: StageReport {
            stage: Stage::LeadCreated,
            focus: None,
        },
        target: None,
    })
}

/// Linked-PR summary for one issue: the first merge candidate and the
/// first open PR, in timeline order.
pub(crate) struct LinkedState {
    pub candidate: Option<PullRequest>,
    pub open: Option<PullRequest>,
}

impl LinkedState {
    pub fn focus_pr(&self) -> Option<&PullRequest> {
        self.candidate.as_ref().or(self.open.as_ref())
    }
}

pub(crate) fn linked_state(tracker: &dyn Tracker, issue_number: u64) -> Result<LinkedState> {
    let mut candidate = None;
    let mut open = None;

    for pr in tracker.linked_pull_requests(issue_number)? {
        if !pr.is_open() {
            continue;
        }
        if candidate.is_none() {
            let review = tracker.review_requested(pr.number)?;
            if readiness::evaluate(&pr, review).is_candidate() {
                candidate = Some(pr.clone());
            }
        }
        if open.is_none() {
            open = Some(pr);
        }
        if candidate.is_some() {
            break;
        }
    }

    Ok(LinkedState { candidate, open })
}

fn issue_resolution(tracker: &dyn Tracker, phase: Phase, issue: &Issue) -> Result<Resolution> {
    let linked = linked_state(tracker, issue.number)?;
    let sub = if linked.candidate.is_some() {
        SubStage::MergeReady
    } else if linked.open.is_some() {
        SubStage::Executing
    } else {
        SubStage::Created
    };

    let target = linked.candidate.clone().map(|pr| MergeTarget {
        phase,
        issue: issue.clone(),
        pr,
    });

    Ok(Resolution {
        report: report(phase, sub, issue, linked.focus_pr()),
        target,
    })
}

fn artifact_resolution(
    tracker: &dyn Tracker,
    phase: Phase,
    pending: &[&Artifact],
    processed: &[&Artifact],
    issues: &[Issue],
) -> Result<Resolution> {
    // An unpromoted pending item means this phase is still at `created`.
    for artifact in pending {
        if matcher::match_work_item(&artifact.text, issues).is_none() {
            let title = matcher::derive_title(&artifact.text).unwrap_or_else(|| artifact.id.clone());
            return Ok(Resolution {
                report: StageReport {
                    stage: Stage::new(phase, SubStage::Created),
                    focus: Some(Focus {
                        title,
                        issue_number: None,
                        pr_number: None,
                        pr_url: None,
                    }),
                },
                target: None,
            });
        }
    }

    let mut matched: Vec<&Issue> = Vec::new();
    for artifact in pending.iter().chain(processed.iter()) {
        if let Some(issue) = matcher::match_work_item(&artifact.text, issues) {
            if !matched.iter().any(|m| m.number == issue.number) {
                matched.push(issue);
            }
        }
    }

    let mut executing: Option<(&Issue, LinkedState)> = None;
    for &issue in &matched {
        let linked = linked_state(tracker, issue.number)?;
        if let Some(pr) = linked.candidate.clone() {
            return Ok(Resolution {
                report: report(phase, SubStage::MergeReady, issue, Some(&pr)),
                target: Some(MergeTarget {
                    phase,
                    issue: issue.clone(),
                    pr,
                }),
            });
        }
        if executing.is_none() {
            executing = Some((issue, linked));
        }
    }

    if let Some((issue, linked)) = executing {
        return Ok(Resolution {
            report: report(phase, SubStage::Executing, issue, linked.focus_pr()),
            target: None,
        });
    }

    // Only processed artifacts whose issues have since closed: the work
    // is in flight somewhere, report executing rather than idle.
    let title = processed
        .first()
        .or_else(|| pending.first())
        .and_then(|a| matcher::derive_title(&a.text));
    Ok(Resolution {
        report: StageReport {
            stage: Stage::new(phase, SubStage::Executing),
            focus: title.map(|title| Focus {
                title,
                issue_number: None,
                pr_number: None,
                pr_url: None,
            }),
        },
        target: None,
    })
}

fn report(phase: Phase, sub: SubStage, issue: &Issue, pr: Option<&PullRequest>) -> StageReport {
    StageReport {
        stage: Stage::new(phase, sub),
        focus: Some(Focus {
            title: issue.title.clone(),
            issue_number: Some(issue.number),
            pr_number: pr.map(|p| p.number),
            pr_url: pr.map(|p| p.url.clone()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tracker::fake::FakeTracker;

    fn config() -> Config {
        toml::from_str("repository = \"octo/workflow\"").unwrap()
    }

    fn open_pr(number: u64) -> PullRequest {
        PullRequest {
            number,
            title: format!("Change #{number}"),
            url: format!("https://example.test/pr/{number}"),
            state: "open".to_string(),
            is_draft: false,
            merged: false,
            mergeable: Some(true),
            mergeable_state: Some("clean".to_string()),
            head_ref: format!("feature-{number}"),
            head_repo: "octo/workflow".to_string(),
            base_ref: "main".to_string(),
        }
    }

    #[test]
    fn empty_tracker_is_idle_at_lead_created() {
        let tracker = FakeTracker::new();
        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::LeadCreated);
        assert!(report.focus.is_none());
    }

    #[test]
    fn lead_issue_without_prs_is_lead_created() {
        let tracker = FakeTracker::new();
        let number = tracker.add_issue("Run gap analysis", "body", &["Gap Analysis"]);
        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::LeadCreated);
        assert_eq!(report.focus.unwrap().issue_number, Some(number));
    }

    #[test]
    fn lead_title_match_is_case_insensitive() {
        let tracker = FakeTracker::new();
        tracker.add_issue("gap ANALYSIS", "body", &[]);
        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::LeadCreated);
        assert!(report.focus.is_some());
    }

    #[test]
    fn lead_with_open_pr_but_no_review_is_executing() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Run gap analysis", "body", &[]);
        tracker.add_pr(open_pr(7));
        tracker.link(issue, 7);
        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::LeadExecuting);
        assert_eq!(report.focus.unwrap().pr_number, Some(7));
    }

    #[test]
    fn lead_with_merge_candidate_is_merge_ready() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Run gap analysis", "body", &[]);
        tracker.add_pr(open_pr(7));
        tracker.link(issue, 7);
        tracker.request_review(7);

        let resolution = resolve(&tracker, &config()).unwrap();
        assert_eq!(resolution.report.stage, Stage::LeadMergeReady);
        assert_eq!(resolution.target.unwrap().pr.number, 7);
    }

    #[test]
    fn draft_pr_with_review_request_is_still_merge_ready() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Run gap analysis", "body", &[]);
        let mut pr = open_pr(7);
        pr.is_draft = true;
        tracker.add_pr(pr);
        tracker.link(issue, 7);
        tracker.request_review(7);

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::LeadMergeReady);
    }

    #[test]
    fn capability_issue_outranks_development_artifacts() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Teach agent to run benchmarks", "body", &["Update Capability"]);
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n\ndetails");

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::CapabilityCreated);
        assert_eq!(report.focus.unwrap().issue_number, Some(issue));
    }

    #[test]
    fn unmatched_pending_item_is_dev_created() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n\ndetails");

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::DevCreated);
        let focus = report.focus.unwrap();
        assert_eq!(focus.title, "Add retry logic");
        assert!(focus.issue_number.is_none());
    }

    #[test]
    fn matched_pending_item_with_candidate_pr_is_dev_merge_ready() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Add retry logic", "body", &["Development"]);
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n\ndetails");
        tracker.add_pr(open_pr(12));
        tracker.link(issue, 12);
        tracker.request_review(12);

        let resolution = resolve(&tracker, &config()).unwrap();
        assert_eq!(resolution.report.stage, Stage::DevMergeReady);
        let target = resolution.target.unwrap();
        assert_eq!(target.issue.number, issue);
        assert_eq!(target.pr.number, 12);
    }

    #[test]
    fn matched_item_without_prs_is_dev_executing() {
        let tracker = FakeTracker::new();
        let issue = tracker.add_issue("Add retry logic", "body", &["Development"]);
        tracker.put_file_raw("planning/issue_queue/processed/dev-001.md", "# Add retry logic\n\ndetails");

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::DevExecuting);
        assert_eq!(report.focus.unwrap().issue_number, Some(issue));
    }

    #[test]
    fn orphaned_processed_artifact_is_dev_executing() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw("planning/issue_queue/processed/dev-001.md", "# Add retry logic\n\ndetails");

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::DevExecuting);
        assert_eq!(report.focus.unwrap().title, "Add retry logic");
    }

    #[test]
    fn capability_prefixed_artifact_uses_capability_phase() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw(
            "planning/issue_queue/pending/capability-pr-42.md",
            "# Update system capabilities based on merged PR #42\n\ndetails",
        );

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::CapabilityCreated);
    }

    #[test]
    fn development_artifacts_outrank_capability_artifacts() {
        let tracker = FakeTracker::new();
        tracker.put_file_raw("planning/issue_queue/pending/dev-001.md", "# Add retry logic\n");
        tracker.put_file_raw("planning/issue_queue/pending/capability-pr-42.md", "# Update capabilities\n");

        let report = infer(&tracker, &config()).unwrap();
        assert_eq!(report.stage, Stage::DevCreated);
    }
}

//! Auto-resume nudges for a stalled coding agent.
//!
//! The decision is a pure function of the PR's event history, its comment
//! thread, the clock, and the policy; the operator only applies it. That
//! keeps every rate-limit and idempotency rule testable without a tracker.

use jiff::{SignedDuration, Timestamp};
use tracing::info;

use crate::config::Config;
use crate::model::{AgentEvent, Comment, StepReport};
use crate::tracker::{Result, Tracker};

/// The fixed comment posted to wake the agent. Idempotency keys on the
/// exact text, so it must never vary per call.
pub const RESUME_MESSAGE: &str =
    "The previous agent run stopped before finishing. Please resume work on this pull request.";

#[derive(Debug, Clone)]
pub struct NudgePolicy {
    /// How long after a failure event before the first nudge.
    pub delay: SignedDuration,

    /// Maximum nudges within the rolling window.
    pub max_nudges: u32,

    /// Rolling budget window.
    pub window: SignedDuration,
}

impl NudgePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            delay: SignedDuration::from_secs(config.nudge_delay_seconds as i64),
            max_nudges: config.max_nudges,
            window: SignedDuration::from_secs(config.nudge_window_seconds as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeDecision {
    Post,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No failure event on record.
    NoFailure,

    /// The agent produced a newer started/succeeded event.
    AgentResumed,

    /// The configured delay after the failure has not elapsed.
    DelayPending,

    /// An identical nudge already follows the failure.
    AlreadyNudged,

    /// The rolling-window budget is spent.
    BudgetExhausted,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::NoFailure => "no agent failure on record",
            Self::AgentResumed => "agent has resumed since the failure",
            Self::DelayPending => "still within the post-failure delay",
            Self::AlreadyNudged => "an identical nudge already exists",
            Self::BudgetExhausted => "nudge budget for the window is spent",
        }
    }
}

/// Decide whether to post a nudge right now.
pub fn decide(
    events: &[AgentEvent],
    comments: &[Comment],
    now: Timestamp,
    policy: &NudgePolicy,
) -> NudgeDecision {
    let Some(failure) = events
        .iter()
        .filter(|e| e.kind.is_failure())
        .max_by_key(|e| e.at)
    else {
        return NudgeDecision::Skip(SkipReason::NoFailure);
    };

    let last_progress = events
        .iter()
        .filter(|e| e.kind.is_progress())
        .map(|e| e.at)
        .max();

    if last_progress.is_some_and(|at| at > failure.at) {
        return NudgeDecision::Skip(SkipReason::AgentResumed);
    }

    if now < failure.at + policy.delay {
        return NudgeDecision::Skip(SkipReason::DelayPending);
    }

    if comments
        .iter()
        .any(|c| c.body == RESUME_MESSAGE && c.created_at > failure.at)
    {
        return NudgeDecision::Skip(SkipReason::AlreadyNudged);
    }

    // The budget window never reaches back past the agent's last sign of
    // life; otherwise ancient nudges would starve a fresh failure.
    let mut window_start = now - policy.window;
    if let Some(progress) = last_progress {
        window_start = window_start.max(progress);
    }
    let recent = comments
        .iter()
        .filter(|c| c.body == RESUME_MESSAGE && c.created_at >= window_start)
        .count();
    if recent >= policy.max_nudges as usize {
        return NudgeDecision::Skip(SkipReason::BudgetExhausted);
    }

    NudgeDecision::Post
}

/// Apply the policy to one pull request.
pub fn run(tracker: &dyn Tracker, config: &Config, pr_number: u64) -> Result<StepReport> {
    let events = tracker.agent_events(pr_number)?;
    let comments = tracker.list_comments(pr_number)?;
    let policy = NudgePolicy::from_config(config);

    match decide(&events, &comments, Timestamp::now(), &policy) {
        NudgeDecision::Post => {
            tracker.post_comment(pr_number, RESUME_MESSAGE)?;
            info!(pr = pr_number, "posted resume nudge");
            Ok(StepReport::completed(format!("nudged PR #{pr_number}")).with_pr(pr_number))
        }
        NudgeDecision::Skip(reason) => Ok(StepReport::idle(reason.describe())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::AgentEventKind;

    fn ts(minutes: i64) -> Timestamp {
        Timestamp::UNIX_EPOCH + SignedDuration::from_mins(minutes)
    }

    fn event(kind: AgentEventKind, minutes: i64) -> AgentEvent {
        AgentEvent {
            kind,
            at: ts(minutes),
        }
    }

    fn nudge_comment(minutes: i64) -> Comment {
        Comment {
            author: "cadence".to_string(),
            body: RESUME_MESSAGE.to_string(),
            created_at: ts(minutes),
        }
    }

    fn policy() -> NudgePolicy {
        NudgePolicy {
            delay: SignedDuration::from_mins(15),
            max_nudges: 3,
            window: SignedDuration::from_hours(24),
        }
    }

    #[test]
    fn no_failure_means_no_nudge() {
        let events = [event(AgentEventKind::Started, 0)];
        assert_eq!(
            decide(&events, &[], ts(60), &policy()),
            NudgeDecision::Skip(SkipReason::NoFailure)
        );
    }

    #[test]
    fn resumed_agent_is_left_alone() {
        let events = [
            event(AgentEventKind::Failed, 10),
            event(AgentEventKind::Started, 20),
        ];
        assert_eq!(
            decide(&events, &[], ts(60), &policy()),
            NudgeDecision::Skip(SkipReason::AgentResumed)
        );
    }

    #[test]
    fn nudge_waits_out_the_delay() {
        let events = [event(AgentEventKind::Failed, 10)];
        assert_eq!(
            decide(&events, &[], ts(20), &policy()),
            NudgeDecision::Skip(SkipReason::DelayPending)
        );
        assert_eq!(decide(&events, &[], ts(26), &policy()), NudgeDecision::Post);
    }

    #[test]
    fn identical_nudge_after_the_failure_blocks_reposting() {
        let events = [event(AgentEventKind::Failed, 10)];
        let comments = [nudge_comment(30)];
        assert_eq!(
            decide(&events, &comments, ts(60), &policy()),
            NudgeDecision::Skip(SkipReason::AlreadyNudged)
        );
    }

    #[test]
    fn old_nudges_before_the_failure_do_not_count_as_duplicates() {
        let events = [event(AgentEventKind::Failed, 100)];
        let comments = [nudge_comment(5)];
        assert_eq!(
            decide(&events, &comments, ts(200), &policy()),
            NudgeDecision::Post
        );
    }

    #[test]
    fn budget_is_enforced_within_the_window() {
        // Three older failure/nudge rounds, then a fresh failure.
        let events = [event(AgentEventKind::Failed, 400)];
        let comments = [nudge_comment(100), nudge_comment(200), nudge_comment(300)];
        assert_eq!(
            decide(&events, &comments, ts(500), &policy()),
            NudgeDecision::Skip(SkipReason::BudgetExhausted)
        );
    }

    #[test]
    fn progress_since_the_old_nudges_resets_the_budget() {
        let events = [
            event(AgentEventKind::Failed, 100),
            event(AgentEventKind::Started, 350),
            event(AgentEventKind::Failed, 400),
        ];
        let comments = [nudge_comment(110), nudge_comment(200), nudge_comment(300)];
        assert_eq!(
            decide(&events, &comments, ts(500), &policy()),
            NudgeDecision::Post
        );
    }

    #[test]
    fn stopped_counts_as_failure() {
        let events = [event(AgentEventKind::Stopped, 10)];
        assert_eq!(decide(&events, &[], ts(60), &policy()), NudgeDecision::Post);
    }

    #[test]
    fn operator_posts_exactly_once() {
        use crate::tracker::fake::FakeTracker;

        let tracker = FakeTracker::new();
        let config: Config = toml::from_str(
            "repository = \"octo/workflow\"\nnudge-delay-seconds = 0",
        )
        .unwrap();
        tracker.add_agent_event(
            12,
            AgentEvent {
                kind: AgentEventKind::Failed,
                at: Timestamp::UNIX_EPOCH,
            },
        );

        run(&tracker, &config, 12).unwrap();
        run(&tracker, &config, 12).unwrap();

        let nudges: Vec<_> = tracker
            .comments_on(12)
            .into_iter()
            .filter(|c| c.body == RESUME_MESSAGE)
            .collect();
        assert_eq!(nudges.len(), 1);
    }
}

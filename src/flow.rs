//! The persisted workflow snapshot and its state machine.
//!
//! Unlike stage inference, which is re-derived from the tracker on every
//! call, the flow snapshot is a deliberately persisted record of where a
//! driven workflow run sits. Transitions follow one fixed cycle; anything
//! else fails loudly rather than silently corrupting the record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Explicit workflow states, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    PlanningReady,
    GapAnalysisRunning,
    PendingIssueCreated,
    IssueCreated,
    PrInProgress,
    PrCompletedUnreviewed,
    PrMerged,
    PostPrSynthesisRunning,
    SystemCapabilitiesUpdated,
}

impl FlowState {
    /// The one state this state may advance to.
    pub fn next(self) -> Self {
        match self {
            Self::PlanningReady => Self::GapAnalysisRunning,
            Self::GapAnalysisRunning => Self::PendingIssueCreated,
            Self::PendingIssueCreated => Self::IssueCreated,
            Self::IssueCreated => Self::PrInProgress,
            Self::PrInProgress => Self::PrCompletedUnreviewed,
            Self::PrCompletedUnreviewed => Self::PrMerged,
            Self::PrMerged => Self::PostPrSynthesisRunning,
            Self::PostPrSynthesisRunning => Self::SystemCapabilitiesUpdated,
            Self::SystemCapabilitiesUpdated => Self::PlanningReady,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        to == self.next()
    }
}

#[derive(Debug, Error)]
#[error("illegal workflow transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: FlowState,
    pub to: FlowState,
}

/// What the current flow state refers to, when anything. The wire keys,
/// including `queue_id` for the work item, predate this crate; keep them
/// stable so older snapshots still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntity {
    #[serde(rename = "issue_id", default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,

    #[serde(rename = "queue_id", default, skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// The persisted snapshot: one state plus the entity it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub state: FlowState,

    #[serde(default)]
    pub entity: FlowEntity,
}

impl Default for FlowSnapshot {
    fn default() -> Self {
        Self {
            state: FlowState::PlanningReady,
            entity: FlowEntity::default(),
        }
    }
}

impl FlowSnapshot {
    /// Advance to `to`, replacing the entity. Rejects any transition not in
    /// the cycle, leaving the snapshot untouched.
    pub fn transition(&mut self, to: FlowState, entity: FlowEntity) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(to) {
            return Err(IllegalTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.entity = entity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipping_states_is_rejected() {
        let mut snapshot = FlowSnapshot::default();
        let err = snapshot
            .transition(FlowState::IssueCreated, FlowEntity::default())
            .unwrap_err();
        assert_eq!(err.from, FlowState::PlanningReady);
        assert_eq!(err.to, FlowState::IssueCreated);
        assert_eq!(snapshot.state, FlowState::PlanningReady);
    }

    #[test]
    fn the_single_legal_successor_is_accepted() {
        let mut snapshot = FlowSnapshot::default();
        snapshot
            .transition(FlowState::GapAnalysisRunning, FlowEntity::default())
            .unwrap();
        assert_eq!(snapshot.state, FlowState::GapAnalysisRunning);
    }

    #[test]
    fn staying_put_is_not_a_transition() {
        let mut snapshot = FlowSnapshot::default();
        assert!(snapshot
            .transition(FlowState::PlanningReady, FlowEntity::default())
            .is_err());
    }

    #[test]
    fn the_cycle_returns_to_planning() {
        let mut snapshot = FlowSnapshot::default();
        let mut state = snapshot.state;
        for _ in 0..9 {
            state = state.next();
            snapshot.transition(state, FlowEntity::default()).unwrap();
        }
        assert_eq!(snapshot.state, FlowState::PlanningReady);
    }

    #[test]
    fn entity_travels_with_the_transition() {
        let mut snapshot = FlowSnapshot::default();
        let entity = FlowEntity {
            issue_number: Some(42),
            repository: Some("octo/workflow".to_string()),
            ..FlowEntity::default()
        };
        snapshot
            .transition(FlowState::GapAnalysisRunning, entity.clone())
            .unwrap();
        assert_eq!(snapshot.entity, entity);
    }

    #[test]
    fn states_serialize_in_lowercase_snake_case() {
        let json = serde_json::to_string(&FlowState::PrCompletedUnreviewed).unwrap();
        assert_eq!(json, "\"pr_completed_unreviewed\"");
        let json = serde_json::to_string(&FlowState::PlanningReady).unwrap();
        assert_eq!(json, "\"planning_ready\"");
    }

    #[test]
    fn entity_keeps_the_legacy_wire_keys() {
        let entity = FlowEntity {
            issue_number: Some(7),
            pr_number: Some(12),
            work_item_id: Some("dev-001.md".to_string()),
            repository: Some("octo/workflow".to_string()),
        };
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["issue_id"], 7);
        assert_eq!(json["pr_number"], 12);
        assert_eq!(json["queue_id"], "dev-001.md");
        assert_eq!(json["repository"], "octo/workflow");

        let parsed: FlowEntity =
            serde_json::from_str(r#"{"issue_id": 7, "queue_id": "dev-001.md"}"#).unwrap();
        assert_eq!(parsed.issue_number, Some(7));
        assert_eq!(parsed.work_item_id.as_deref(), Some("dev-001.md"));
    }
}

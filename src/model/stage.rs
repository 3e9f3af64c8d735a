//! Pipeline stage types: the fixed 3-phase × 3-sub-stage topology.

use serde::{Deserialize, Serialize};

/// One of the nine positions in the pipeline.
///
/// A closed enum rather than a stage string: adding a stage is a
/// compile-time exhaustiveness change, not a string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    LeadCreated,
    LeadExecuting,
    LeadMergeReady,
    DevCreated,
    DevExecuting,
    DevMergeReady,
    CapabilityCreated,
    CapabilityExecuting,
    CapabilityMergeReady,
}

impl Stage {
    pub fn new(phase: Phase, sub: SubStage) -> Self {
        match (phase, sub) {
            (Phase::Lead, SubStage::Created) => Self::LeadCreated,
            (Phase::Lead, SubStage::Executing) => Self::LeadExecuting,
            (Phase::Lead, SubStage::MergeReady) => Self::LeadMergeReady,
            (Phase::Development, SubStage::Created) => Self::DevCreated,
            (Phase::Development, SubStage::Executing) => Self::DevExecuting,
            (Phase::Development, SubStage::MergeReady) => Self::DevMergeReady,
            (Phase::Capability, SubStage::Created) => Self::CapabilityCreated,
            (Phase::Capability, SubStage::Executing) => Self::CapabilityExecuting,
            (Phase::Capability, SubStage::MergeReady) => Self::CapabilityMergeReady,
        }
    }

    /// The operator that advances this stage.
    ///
    /// Total by construction: every stage maps to exactly one operator.
    pub fn operator(self) -> Operator {
        match self {
            Self::LeadCreated => Operator::EnsureLead,
            Self::DevCreated => Operator::Promote,
            Self::LeadMergeReady | Self::DevMergeReady | Self::CapabilityMergeReady => {
                Operator::Merge
            }
            Self::LeadExecuting
            | Self::DevExecuting
            | Self::CapabilityExecuting
            | Self::CapabilityCreated => Operator::Wait,
        }
    }

    /// Dotted display form, e.g. `dev.mergeReady`.
    pub fn label(self) -> &'static str {
        match self {
            Self::LeadCreated => "lead.created",
            Self::LeadExecuting => "lead.executing",
            Self::LeadMergeReady => "lead.mergeReady",
            Self::DevCreated => "dev.created",
            Self::DevExecuting => "dev.executing",
            Self::DevMergeReady => "dev.mergeReady",
            Self::CapabilityCreated => "capability.created",
            Self::CapabilityExecuting => "capability.executing",
            Self::CapabilityMergeReady => "capability.mergeReady",
        }
    }
}

/// The three workflow phases, in fixed priority order: lead work always
/// outranks capability updates, which outrank new development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lead,
    Development,
    Capability,
}

/// Where within a phase the work currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubStage {
    Created,
    Executing,
    MergeReady,
}

/// The mechanical step associated with a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    EnsureLead,
    Promote,
    Merge,
    /// Nothing mechanical to do; the agent (or a monitor) owns this stage.
    Wait,
}

/// The single most relevant item in the inferred stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Focus {
    pub title: String,
    pub issue_number: Option<u64>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
}

/// Result of one stage inference pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub focus: Option<Focus>,
}

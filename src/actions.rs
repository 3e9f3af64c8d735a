//! Action operators: the one mutating step of each reconcile cycle.
//!
//! Each operator is idempotent against unchanged external state and performs
//! at most one externally visible main mutation per call. Secondary effects
//! (approve, branch delete, label ensure) are best-effort and surface as
//! warnings on the report, never as failures of the main action.

pub mod ensure_lead;
pub mod merge;
pub mod promote;

use crate::config::Config;
use crate::model::{Operator, StageReport, StepReport};
use crate::stage;
use crate::tracker::{Result, Tracker};

/// One reconcile cycle: infer the stage, run the operator it maps to.
pub fn step(tracker: &dyn Tracker, config: &Config) -> Result<(StageReport, StepReport)> {
    let resolution = stage::resolve(tracker, config)?;
    let stage_report = resolution.report.clone();

    let report = match stage_report.stage.operator() {
        Operator::EnsureLead => ensure_lead::run(tracker, config)?,
        Operator::Promote => promote::run(tracker, config)?,
        Operator::Merge => match resolution.target {
            Some(target) => merge::merge_target(tracker, config, &target)?,
            None => StepReport::idle("no merge candidate"),
        },
        Operator::Wait => StepReport::idle(format!(
            "stage {} is waiting on the agent",
            stage_report.stage.label()
        )),
    };

    Ok((stage_report, report))
}

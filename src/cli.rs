//! CLI interface for Cadence.
//!
//! Each subcommand is non-interactive: arguments in, structured output out.
//! `status` and `step` are the reconcile loop's entry points; the rest give
//! a human direct access to individual operators and the background pieces.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::flow::{FlowEntity, FlowState};
use crate::model::{StepOutcome, StepReport};
use crate::monitor::{self, MonitorOptions};
use crate::storage::{self, FlowStore, JobStore};
use crate::tracker::Tracker;
use crate::tracker::gh::GhTracker;
use crate::{actions, nudge, stage};

/// Cadence — keep a tracker-driven development pipeline moving.
#[derive(Debug, Parser)]
#[command(name = "cadence")]
pub struct Cli {
    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Infer and print the current pipeline stage. Pure read.
    Status,

    /// Run one reconcile cycle: infer the stage, apply its operator.
    Step,

    /// Ensure the lead gap-analysis issue exists, is safe, and is assigned.
    EnsureLead,

    /// Promote the next pending work item into a tracked issue.
    Promote,

    /// Merge the next ready pull request, if the safety gates allow.
    Merge,

    /// Watch an issue's linked pull requests until they settle.
    Monitor {
        /// Issue number to watch.
        issue: u64,

        /// Polling interval in seconds.
        #[arg(long)]
        poll_seconds: Option<f64>,

        /// Overall timeout in seconds (0 means no timeout).
        #[arg(long)]
        timeout_seconds: Option<f64>,

        /// Complete with `no_pr` instead of waiting when no PR appears.
        #[arg(long)]
        allow_no_pr: bool,
    },

    /// List monitor job records, or show one in full.
    Jobs {
        /// Job id to show.
        id: Option<String>,
    },

    /// Post a resume nudge to a stalled agent PR, if policy allows.
    Nudge {
        /// Pull request number.
        pr: u64,
    },

    /// Show or advance the persisted workflow snapshot.
    Flow {
        #[command(subcommand)]
        command: FlowCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum FlowCommand {
    /// Print the current snapshot.
    Show,

    /// Advance the snapshot to the given state.
    Advance {
        state: FlowState,

        #[arg(long)]
        issue: Option<u64>,

        #[arg(long)]
        pr: Option<u64>,

        #[arg(long)]
        work_item: Option<String>,
    },
}

pub fn run(config: &Config) -> Result<(), String> {
    let cli = Cli::parse();
    let tracker = GhTracker::new(config.repository.clone());

    match cli.command {
        Command::Status => cmd_status(&tracker, config, cli.json),
        Command::Step => cmd_step(&tracker, config, cli.json),
        Command::EnsureLead => {
            let report = actions::ensure_lead::run(&tracker, config)
                .map_err(|e| format!("ensure-lead failed: {e}"))?;
            print_report(&report, cli.json)
        }
        Command::Promote => {
            let report = actions::promote::run(&tracker, config)
                .map_err(|e| format!("promote failed: {e}"))?;
            print_report(&report, cli.json)
        }
        Command::Merge => {
            let report = actions::merge::run(&tracker, config)
                .map_err(|e| format!("merge failed: {e}"))?;
            print_report(&report, cli.json)
        }
        Command::Monitor {
            issue,
            poll_seconds,
            timeout_seconds,
            allow_no_pr,
        } => cmd_monitor(
            tracker,
            config,
            issue,
            poll_seconds,
            timeout_seconds,
            allow_no_pr,
            cli.json,
        ),
        Command::Jobs { id } => cmd_jobs(id.as_deref(), cli.json),
        Command::Nudge { pr } => {
            let report = nudge::run(&tracker, config, pr).map_err(|e| format!("nudge failed: {e}"))?;
            print_report(&report, cli.json)
        }
        Command::Flow { command } => cmd_flow(command, cli.json),
    }
}

fn cmd_status(tracker: &dyn Tracker, config: &Config, json: bool) -> Result<(), String> {
    let report = stage::infer(tracker, config).map_err(|e| format!("status failed: {e}"))?;

    if json {
        println!("{}", to_json(&report)?);
        return Ok(());
    }

    println!("stage: {}", report.stage.label());
    if let Some(focus) = &report.focus {
        let mut line = format!("focus: {}", focus.title);
        if let Some(issue) = focus.issue_number {
            line.push_str(&format!(" (issue #{issue}"));
            match focus.pr_number {
                Some(pr) => line.push_str(&format!(", PR #{pr})")),
                None => line.push(')'),
            }
        }
        println!("{line}");
        if let Some(url) = &focus.pr_url {
            println!("pr: {url}");
        }
    }
    Ok(())
}

fn cmd_step(tracker: &dyn Tracker, config: &Config, json: bool) -> Result<(), String> {
    let (stage_report, report) =
        actions::step(tracker, config).map_err(|e| format!("step failed: {e}"))?;

    if json {
        let combined = serde_json::json!({
            "stage": stage_report,
            "result": report,
        });
        println!("{}", serde_json::to_string_pretty(&combined).map_err(|e| e.to_string())?);
        return Ok(());
    }

    println!("stage: {}", stage_report.stage.label());
    print_report(&report, false)
}

fn cmd_monitor(
    tracker: GhTracker,
    config: &Config,
    issue: u64,
    poll_seconds: Option<f64>,
    timeout_seconds: Option<f64>,
    allow_no_pr: bool,
    json: bool,
) -> Result<(), String> {
    let mut options = MonitorOptions::from_config(config);
    if let Some(poll) = poll_seconds {
        if poll <= 0.0 {
            return Err("--poll-seconds must be positive".to_string());
        }
        options.poll_interval = Duration::from_secs_f64(poll);
    }
    if let Some(timeout) = timeout_seconds {
        if timeout < 0.0 {
            return Err("--timeout-seconds must not be negative".to_string());
        }
        options.timeout = Duration::from_secs_f64(timeout);
    }
    options.require_pr = !allow_no_pr;

    let store = Arc::new(open_job_store()?);
    let handle = monitor::start(Arc::new(tracker), store, issue, options);
    if !json {
        println!("job: {}", handle.job_id);
    }
    let job = handle
        .join()
        .ok_or("monitor thread ended without a result")?;

    if json {
        println!("{}", to_json(&job)?);
        return Ok(());
    }

    match job.completion {
        Some(completion) => println!("completion: {}", completion.as_str()),
        None => println!("completion: none"),
    }
    if let Some(error) = &job.error {
        eprintln!("error: {error}");
    }
    Ok(())
}

fn cmd_jobs(id: Option<&str>, json: bool) -> Result<(), String> {
    let store = open_job_store()?;

    if let Some(id) = id {
        let job = store.get(id).ok_or_else(|| format!("no job with id {id}"))?;
        if json {
            println!("{}", to_json(&job)?);
        } else {
            println!("job: {}", job.id);
            println!("issue: #{}", job.issue_number);
            println!("status: {:?}", job.status);
            let completion = job.completion.map_or("-", |c| c.as_str());
            println!("completion: {completion}");
            println!("prs: {:?}", job.pull_request_numbers);
            if let Some(error) = &job.error {
                println!("error: {error}");
            }
        }
        return Ok(());
    }

    let jobs = store.list();

    if json {
        println!("{}", to_json(&jobs)?);
        return Ok(());
    }

    if jobs.is_empty() {
        println!("No monitor jobs");
        return Ok(());
    }
    for job in &jobs {
        let completion = job.completion.map_or("-", |c| c.as_str());
        let short_id = job.id.get(..8).unwrap_or(&job.id);
        println!(
            "{short_id}  issue #{}  {:?}  {completion}  prs {:?}",
            job.issue_number, job.status, job.pull_request_numbers
        );
    }
    Ok(())
}

fn cmd_flow(command: FlowCommand, json: bool) -> Result<(), String> {
    let root = storage::default_root().ok_or("could not determine home directory")?;
    let store = FlowStore::new(root).map_err(|e| format!("failed to open flow store: {e}"))?;

    match command {
        FlowCommand::Show => {
            let snapshot = store.load();
            if json {
                println!("{}", to_json(&snapshot)?);
            } else {
                println!("{:?}", snapshot.state);
            }
            Ok(())
        }
        FlowCommand::Advance {
            state,
            issue,
            pr,
            work_item,
        } => {
            let mut snapshot = store.load();
            snapshot
                .transition(
                    state,
                    FlowEntity {
                        issue_number: issue,
                        pr_number: pr,
                        work_item_id: work_item,
                        repository: None,
                    },
                )
                .map_err(|e| e.to_string())?;
            store
                .save(&snapshot)
                .map_err(|e| format!("failed to save flow snapshot: {e}"))?;
            println!("{:?}", snapshot.state);
            Ok(())
        }
    }
}

fn open_job_store() -> Result<JobStore, String> {
    let root = storage::default_root().ok_or("could not determine home directory")?;
    JobStore::new(root).map_err(|e| format!("failed to open job store: {e}"))
}

fn print_report(report: &StepReport, json: bool) -> Result<(), String> {
    if json {
        println!("{}", to_json(report)?);
        return Ok(());
    }

    match &report.outcome {
        StepOutcome::Completed {
            summary,
            issue_number,
            pr_number,
        } => {
            let mut line = format!("done: {summary}");
            if let Some(issue) = issue_number {
                line.push_str(&format!(" [issue #{issue}]"));
            }
            if let Some(pr) = pr_number {
                line.push_str(&format!(" [PR #{pr}]"));
            }
            println!("{line}");
        }
        StepOutcome::Idle { reason } => println!("idle: {reason}"),
        StepOutcome::Blocked { reason } => println!("blocked: {reason}"),
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

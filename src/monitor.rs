//! Background linked-PR monitors.
//!
//! One thread per monitored issue, blocking only on the sleep between
//! polls. The persisted job record is the sole channel back to the driver:
//! it is rewritten on every tick, not just at termination, so an observer
//! never sees a monitor disappear mid-run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use jiff::Timestamp;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{Completion, JobStatus, MonitorJob, PullRequest};
use crate::storage::JobStore;
use crate::tracker::Tracker;

/// Tuning for one monitor run.
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub poll_interval: Duration,

    /// Overall budget; zero means no timeout.
    pub timeout: Duration,

    /// When false, an empty linked set completes as `NoPr` instead of
    /// waiting for a PR to appear.
    pub require_pr: bool,
}

impl MonitorOptions {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(config.poll_seconds.max(0.1)),
            timeout: Duration::from_secs_f64(config.timeout_seconds.max(0.0)),
            require_pr: true,
        }
    }
}

/// The completion rule applied to one poll's linked-PR snapshot.
/// `None` means keep polling.
pub fn evaluate_completion(prs: &[PullRequest], require_pr: bool) -> Option<Completion> {
    if prs.is_empty() {
        return if require_pr {
            None
        } else {
            Some(Completion::NoPr)
        };
    }
    if prs.iter().any(PullRequest::is_open) {
        return None;
    }
    if prs.iter().all(|p| p.merged) {
        Some(Completion::Merged)
    } else {
        Some(Completion::Closed)
    }
}

/// A handle to a running monitor thread.
pub struct MonitorHandle {
    pub job_id: String,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<MonitorJob>,
}

impl MonitorHandle {
    /// Request a cooperative stop, observed at the top of the next tick.
    #[allow(dead_code)]
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Wait for the monitor to finish and return its final record.
    pub fn join(self) -> Option<MonitorJob> {
        self.thread.join().ok()
    }
}

/// Start monitoring an issue's linked pull requests.
pub fn start(
    tracker: Arc<dyn Tracker>,
    store: Arc<JobStore>,
    issue_number: u64,
    options: MonitorOptions,
) -> MonitorHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let now = Timestamp::now();
    let job = MonitorJob {
        id: Uuid::new_v4().to_string(),
        issue_number,
        status: JobStatus::Queued,
        created_at: now,
        updated_at: now,
        completion: None,
        pull_request_numbers: Vec::new(),
        error: None,
    };
    let job_id = job.id.clone();
    persist(&store, &job);

    let thread = thread::spawn(move || run(tracker, store, job, options, stop_flag));

    MonitorHandle {
        job_id,
        stop,
        thread,
    }
}

fn run(
    tracker: Arc<dyn Tracker>,
    store: Arc<JobStore>,
    mut job: MonitorJob,
    options: MonitorOptions,
    stop: Arc<AtomicBool>,
) -> MonitorJob {
    job.status = JobStatus::Running;
    touch(&store, &mut job);

    let deadline = (!options.timeout.is_zero()).then(|| Instant::now() + options.timeout);

    loop {
        if stop.load(Ordering::Relaxed) {
            job.status = JobStatus::Failed;
            job.error = Some("stopped before completion".to_string());
            break;
        }

        match tracker.linked_pull_requests(job.issue_number) {
            Ok(prs) => {
                let numbers: Vec<u64> = prs.iter().map(|p| p.number).collect();
                if numbers != job.pull_request_numbers {
                    info!(
                        issue = job.issue_number,
                        from = ?job.pull_request_numbers,
                        to = ?numbers,
                        "linked pull request set changed"
                    );
                    job.pull_request_numbers = numbers;
                }
                job.error = None;

                if let Some(completion) = evaluate_completion(&prs, options.require_pr) {
                    job.completion = Some(completion);
                    if completion == Completion::Merged {
                        job.status = JobStatus::Succeeded;
                    } else {
                        job.status = JobStatus::Failed;
                        job.error =
                            Some(format!("linked pull requests ended: {}", completion.as_str()));
                    }
                    break;
                }
            }
            // Transient; record it and keep polling.
            Err(e) => {
                warn!(issue = job.issue_number, error = %e, "poll failed");
                job.error = Some(e.to_string());
            }
        }

        touch(&store, &mut job);

        if deadline.is_some_and(|d| Instant::now() >= d) {
            job.completion = Some(Completion::Timeout);
            job.status = JobStatus::Failed;
            job.error = Some("timed out waiting for linked pull requests".to_string());
            break;
        }

        // Never sleep past the deadline; a short timeout should fire on time.
        let sleep = match deadline {
            Some(d) => options.poll_interval.min(d.saturating_duration_since(Instant::now())),
            None => options.poll_interval,
        };
        thread::sleep(sleep);
    }

    touch(&store, &mut job);
    info!(
        issue = job.issue_number,
        status = ?job.status,
        completion = ?job.completion,
        "monitor finished"
    );
    job
}

fn touch(store: &JobStore, job: &mut MonitorJob) {
    job.updated_at = Timestamp::now();
    persist(store, job);
}

fn persist(store: &JobStore, job: &MonitorJob) {
    if let Err(e) = store.upsert(job) {
        warn!(job = %job.id, error = %e, "could not persist job record");
    }
}

//! Local persistence for monitor jobs and the workflow snapshot.
//!
//! Everything lives under one state root:
//!
//! ```text
//! <root>/
//!   jobs.json    # All monitor job records, as a JSON list
//!   flow.json    # The single workflow snapshot
//! ```
//!
//! Both files tolerate being absent or malformed: readers get the empty or
//! initial value instead of an error. Only writes can fail.

use std::path::PathBuf;
use std::sync::Mutex;
use std::{fs, io};

use crate::flow::FlowSnapshot;
use crate::model::MonitorJob;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// Returns the default state root: `~/.cadence/state/`.
pub fn default_root() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cadence").join("state"))
}

/// Persisted monitor job records.
///
/// The file is the shared resource between the driver and background
/// monitor threads; the mutex serializes read-modify-write cycles.
pub struct JobStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JobStore {
    /// Opens (creating the root if needed) the job store under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            path: root.join("jobs.json"),
            lock: Mutex::new(()),
        })
    }

    /// All job records. Absent or unreadable files are an empty list.
    pub fn list(&self) -> Vec<MonitorJob> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read()
    }

    /// One job by id.
    pub fn get(&self, id: &str) -> Option<MonitorJob> {
        self.list().into_iter().find(|j| j.id == id)
    }

    /// Inserts or replaces a job record by id.
    pub fn upsert(&self, job: &MonitorJob) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs = self.read();
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }
        let json = serde_json::to_string_pretty(&jobs)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn read(&self) -> Vec<MonitorJob> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        serde_json::from_str(&contents).unwrap_or_default()
    }
}

/// The single persisted workflow snapshot.
pub struct FlowStore {
    path: PathBuf,
}

impl FlowStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            path: root.join("flow.json"),
        })
    }

    /// The current snapshot; absent or malformed files give the initial one.
    pub fn load(&self) -> FlowSnapshot {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return FlowSnapshot::default();
        };
        serde_json::from_str(&contents).unwrap_or_default()
    }

    pub fn save(&self, snapshot: &FlowSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

//! Cadence configuration.
//!
//! Loaded from `~/.cadence/config.toml`. Only the repository is required;
//! every tuning knob has a default chosen to match the workflow's pacing.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

/// Cadence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The tracked repository, as `owner/repo`.
    pub repository: String,

    /// Login assigned to issues the coding agent should pick up.
    #[serde(default = "default_agent_login")]
    pub agent_login: String,

    /// Root of the work-item queue inside the tracked repository.
    #[serde(default = "default_queue_root")]
    pub queue_root: String,

    /// Seconds between linked-PR polls.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: f64,

    /// Overall monitor timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    /// Seconds to wait after an agent failure before nudging.
    #[serde(default = "default_nudge_delay_seconds")]
    pub nudge_delay_seconds: u64,

    /// Maximum nudge comments within the rolling window.
    #[serde(default = "default_max_nudges")]
    pub max_nudges: u32,

    /// Rolling nudge-budget window in seconds.
    #[serde(default = "default_nudge_window_seconds")]
    pub nudge_window_seconds: u64,
}

fn default_agent_login() -> String {
    // The documented login for the hosted coding agent.
    "copilot-swe-agent[bot]".to_string()
}

fn default_queue_root() -> String {
    "planning/issue_queue".to_string()
}

fn default_poll_seconds() -> f64 {
    10.0
}

fn default_timeout_seconds() -> f64 {
    1800.0
}

fn default_nudge_delay_seconds() -> u64 {
    900
}

fn default_max_nudges() -> u32 {
    3
}

fn default_nudge_window_seconds() -> u64 {
    86_400
}

impl Config {
    /// Load config from `~/.cadence/config.toml`.
    /// Returns an error if the file is missing or invalid.
    pub fn load() -> Result<Self, String> {
        let path = Self::path().ok_or("could not determine home directory")?;

        if !path.exists() {
            return Err(format!(
                "no config file found at {}\n\
                 Create one with at minimum:\n\n\
                 repository = \"owner/repo\"",
                path.display()
            ));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;

        if config.repository.trim().is_empty() {
            return Err(format!(
                "repository is empty in {}\n\
                 Set it to the tracked repository as \"owner/repo\".",
                path.display()
            ));
        }

        Ok(config)
    }

    /// The config file path: `~/.cadence/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".cadence").join("config.toml"))
    }

    /// Queue directory for a location, e.g. `planning/issue_queue/pending`.
    pub fn queue_dir(&self, location: crate::model::QueueLocation) -> String {
        format!(
            "{}/{}",
            self.queue_root.trim_end_matches('/'),
            location.dir_name()
        )
    }

    /// Queue path for a specific item.
    pub fn queue_path(&self, location: crate::model::QueueLocation, id: &str) -> String {
        format!("{}/{id}", self.queue_dir(location))
    }
}

//! Work item types: queued units of work, stored as files in the tracked
//! repository under `pending/`, `processed/`, and `complete/`.

use serde::{Deserialize, Serialize};

/// Marker prefix embedded in issue bodies to link them back to a work item.
///
/// The full marker line is `<!-- cadence-work-item: <id> -->`; searching the
/// tracker for it makes promotion idempotent even if local state is lost.
pub const WORK_ITEM_MARKER_PREFIX: &str = "cadence-work-item:";

/// A single queued work item.
///
/// `id` is the stable filename. The title is derived from the first
/// non-blank line; the body is the full file content plus the marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub location: QueueLocation,
}

impl WorkItem {
    /// The marker line embedded in this item's issue body.
    pub fn marker(&self) -> String {
        format!("{WORK_ITEM_MARKER_PREFIX} {}", self.id)
    }
}

/// Pull the work-item id back out of an issue body carrying the marker.
pub fn extract_work_item_id(body: &str) -> Option<String> {
    let start = body.find(WORK_ITEM_MARKER_PREFIX)? + WORK_ITEM_MARKER_PREFIX.len();
    let id = body[start..]
        .split_whitespace()
        .next()?
        .trim_end_matches("-->");
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Where a work item currently lives in the queue.
///
/// Items only ever move forward: pending → processed → complete. Moves are
/// a write-then-delete pair because the substrate is a content-addressed
/// file API, not a filesystem rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueLocation {
    /// Authored by a cognitive step, not yet promoted to an issue.
    Pending,

    /// Promoted to an issue; work is underway.
    Processed,

    /// The linked pull request merged; the item is done.
    Complete,
}

impl QueueLocation {
    /// The queue subdirectory name for this location.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Complete => "complete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_a_marker_comment() {
        let body = "Fix the thing.\n\n<!-- cadence-work-item: dev-001.md -->";
        assert_eq!(extract_work_item_id(body).as_deref(), Some("dev-001.md"));
    }

    #[test]
    fn extracts_id_when_marker_and_close_share_a_token() {
        let body = "<!-- cadence-work-item: dev-001.md-->";
        assert_eq!(extract_work_item_id(body).as_deref(), Some("dev-001.md"));
    }

    #[test]
    fn body_without_a_marker_has_no_id() {
        assert_eq!(extract_work_item_id("Just a body."), None);
        assert_eq!(extract_work_item_id("<!-- cadence-work-item: -->"), None);
    }
}

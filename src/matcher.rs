//! Work-item matching: map a queued artifact to zero-or-one open issue.
//!
//! Pure and total: same inputs, same output, no tracker calls. The caller
//! hands in the artifact's raw text and a snapshot of open issues.

use similar::TextDiff;

use crate::model::Issue;

/// Minimum similarity ratio for a fuzzy title match.
///
/// Conservative on purpose: below this bound, accepting the best match
/// risks cross-matching unrelated titles. Exact normalized equality always
/// wins regardless of this value.
pub const SIMILARITY_THRESHOLD: f32 = 0.92;

/// Derive an issue title from a work item's raw text.
///
/// The title is the first non-blank line with markdown heading markers and
/// surrounding whitespace stripped. Returns `None` for blank content.
pub fn derive_title(raw: &str) -> Option<String> {
    let first = raw.lines().find(|l| !l.trim().is_empty())?;
    let title = first.trim().trim_start_matches('#').trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Normalize a title for comparison: lowercase, internal whitespace
/// collapsed to single spaces.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the open issue a work item maps to, if any.
///
/// Exact normalized-title equality wins immediately. Otherwise the best
/// fuzzy match is accepted only at or above [`SIMILARITY_THRESHOLD`].
/// `None` means the item is unpromoted.
pub fn match_work_item<'a>(raw: &str, open_issues: &'a [Issue]) -> Option<&'a Issue> {
    let title = derive_title(raw)?;
    let wanted = normalize_title(&title);

    if let Some(exact) = open_issues
        .iter()
        .find(|i| normalize_title(&i.title) == wanted)
    {
        return Some(exact);
    }

    let mut best: Option<(&Issue, f32)> = None;
    for issue in open_issues {
        let ratio = similarity(&wanted, &normalize_title(&issue.title));
        if best.is_none_or(|(_, b)| ratio > b) {
            best = Some((issue, ratio));
        }
    }

    match best {
        Some((issue, ratio)) if ratio >= SIMILARITY_THRESHOLD => Some(issue),
        _ => None,
    }
}

/// Character-level similarity ratio in `[0.0, 1.0]`.
fn similarity(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

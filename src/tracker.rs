//! Per-page change state machine.
//!
//! [`transition`] is a pure function of the stored record and what this cycle
//! observed; the caller decides when and where to write the result.

use crate::diff;
use crate::errors::CheckFailure;
use crate::results::{CheckState, TrackedPage, Transition};
use chrono::{DateTime, Utc};

/// What a check cycle learned about a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Canonical text of a successful fetch
    Fetched(String),
    Failed(CheckFailure),
}

/// Compute the page's next state.
///
/// A failure only stamps `last_checked_at` and clears `changed`. A success
/// either records the first baseline, confirms the snapshot, or diffs against
/// the previous snapshot before replacing it.
pub fn transition(
    page: &TrackedPage,
    observation: Observation,
    now: DateTime<Utc>,
) -> (CheckState, Transition) {
    match observation {
        Observation::Failed(failure) => {
            let state = CheckState {
                last_snapshot: page.last_snapshot.clone(),
                last_checked_at: Some(now),
                changed: false,
                last_diff: page.last_diff.clone(),
            };
            (state, Transition::Failed(failure))
        }
        Observation::Fetched(canonical) if !page.has_baseline() => {
            let state = CheckState {
                last_snapshot: canonical,
                last_checked_at: Some(now),
                changed: false,
                last_diff: Vec::new(),
            };
            (state, Transition::Baseline)
        }
        Observation::Fetched(canonical) if canonical == page.last_snapshot => {
            let state = CheckState {
                last_snapshot: canonical,
                last_checked_at: Some(now),
                changed: false,
                last_diff: page.last_diff.clone(),
            };
            (state, Transition::Unchanged)
        }
        Observation::Fetched(canonical) => {
            // Diff against the snapshot being replaced
            let blocks = diff::changes(&page.last_snapshot, &canonical);
            let count = blocks.len();
            let state = CheckState {
                last_snapshot: canonical,
                last_checked_at: Some(now),
                changed: true,
                last_diff: blocks,
            };
            (state, Transition::Changed { blocks: count })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffBlock;
    use crate::errors::FailureKind;

    fn checked(page: &TrackedPage, observation: Observation) -> (TrackedPage, Transition) {
        let (state, transition) = transition(page, observation, Utc::now());
        let mut next = page.clone();
        next.apply(state);
        (next, transition)
    }

    #[test]
    fn test_first_success_is_baseline() {
        let page = TrackedPage::new("https://example.com/", "Example");
        let (next, outcome) = checked(&page, Observation::Fetched("<p>hello</p>".to_string()));

        assert_eq!(outcome, Transition::Baseline);
        assert_eq!(next.last_snapshot, "<p>hello</p>");
        assert!(!next.changed);
        assert!(next.last_diff.is_empty());
        assert!(next.last_checked_at.is_some());
    }

    #[test]
    fn test_identical_snapshot_is_unchanged() {
        let page = TrackedPage::new("https://example.com/", "Example");
        let (page, _) = checked(&page, Observation::Fetched("<p>hello</p>".to_string()));
        let before = page.last_checked_at;

        let (next, outcome) = checked(&page, Observation::Fetched("<p>hello</p>".to_string()));
        assert_eq!(outcome, Transition::Unchanged);
        assert_eq!(next.last_snapshot, "<p>hello</p>");
        assert!(!next.changed);
        assert!(next.last_checked_at >= before);
    }

    #[test]
    fn test_different_snapshot_is_changed() {
        let mut page = TrackedPage::new("https://example.com/", "Example");
        page.last_snapshot = "The fox is brown".to_string();

        let (next, outcome) = checked(&page, Observation::Fetched("The fox is red".to_string()));
        assert_eq!(outcome, Transition::Changed { blocks: 2 });
        assert!(next.changed);
        assert_eq!(next.last_snapshot, "The fox is red");
        assert_eq!(
            next.last_diff,
            vec![DiffBlock::delete("brown", 11), DiffBlock::insert("red", 11)]
        );

        // The following identical cycle clears the flag again
        let (after, outcome) = checked(&next, Observation::Fetched("The fox is red".to_string()));
        assert_eq!(outcome, Transition::Unchanged);
        assert!(!after.changed);
    }

    #[test]
    fn test_whitespace_only_change_has_no_blocks() {
        let mut page = TrackedPage::new("https://example.com/", "Example");
        page.last_snapshot = "a b".to_string();

        let (next, outcome) = checked(&page, Observation::Fetched("a  b".to_string()));
        assert_eq!(outcome, Transition::Changed { blocks: 0 });
        assert!(next.changed);
        assert!(next.last_diff.is_empty());
    }

    #[test]
    fn test_failure_leaves_snapshot_and_diff() {
        let mut page = TrackedPage::new("not a url", "Broken");
        page.last_snapshot = "<p>old</p>".to_string();
        page.changed = true;
        page.last_diff = vec![DiffBlock::insert("old", 3)];

        let failure = CheckFailure::new(FailureKind::InvalidUrl, "relative URL without a base");
        let (next, outcome) = checked(&page, Observation::Failed(failure.clone()));

        assert_eq!(outcome, Transition::Failed(failure));
        assert_eq!(next.last_snapshot, "<p>old</p>");
        assert_eq!(next.last_diff, vec![DiffBlock::insert("old", 3)]);
        assert!(!next.changed);
        assert!(next.last_checked_at.is_some());
    }

    #[test]
    fn test_failure_on_new_page_keeps_it_empty() {
        let page = TrackedPage::new("not a url", "Broken");
        let failure = CheckFailure::new(FailureKind::FetchTimeout, "slow");
        let (next, _) = checked(&page, Observation::Failed(failure));
        assert!(!next.has_baseline());
        assert!(!next.changed);

        // The next success is still treated as the baseline
        let (next, outcome) = checked(&next, Observation::Fetched("<p>up</p>".to_string()));
        assert_eq!(outcome, Transition::Baseline);
        assert!(!next.changed);
    }
}

use crate::diff::{self, DiffBlock};
use crate::errors::CheckFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered page and what the last check cycle learned about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPage {
    /// Assigned at registration, never changes
    pub id: Uuid,

    /// Stored as registered; only validated when fetched
    pub url: String,

    pub display_name: String,

    /// Canonical text of the last successful fetch that established or changed the baseline
    #[serde(default)]
    pub last_snapshot: String,

    /// Time of the most recent check attempt, successful or not
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,

    /// True only for the cycle that detected a change
    #[serde(default)]
    pub changed: bool,

    /// Blocks from the most recent detected change
    #[serde(default)]
    pub last_diff: Vec<DiffBlock>,
}

impl TrackedPage {
    /// Create a page that has never been checked
    pub fn new(url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            display_name: display_name.into(),
            last_snapshot: String::new(),
            last_checked_at: None,
            changed: false,
            last_diff: Vec::new(),
        }
    }

    /// Whether a baseline snapshot has been recorded
    pub fn has_baseline(&self) -> bool {
        !self.last_snapshot.is_empty()
    }

    /// The fields a check cycle owns, as they currently stand
    pub fn check_state(&self) -> CheckState {
        CheckState {
            last_snapshot: self.last_snapshot.clone(),
            last_checked_at: self.last_checked_at,
            changed: self.changed,
            last_diff: self.last_diff.clone(),
        }
    }

    /// Overwrite the cycle-owned fields, leaving identity untouched
    pub fn apply(&mut self, state: CheckState) {
        self.last_snapshot = state.last_snapshot;
        self.last_checked_at = state.last_checked_at;
        self.changed = state.changed;
        self.last_diff = state.last_diff;
    }

    /// `last_diff` as `- deleted` / `+ inserted` lines
    pub fn rendered_diff(&self) -> String {
        diff::render(&self.last_diff)
    }

    /// Human-readable form of the most recent change, if one was ever recorded
    pub fn describe_last_change(&self) -> Option<String> {
        if !self.last_diff.is_empty() {
            Some(self.rendered_diff())
        } else if self.changed {
            // Every differing block was whitespace
            Some("changed (whitespace only)".to_string())
        } else {
            None
        }
    }
}

/// The state-machine-owned part of a [`TrackedPage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckState {
    pub last_snapshot: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub changed: bool,
    pub last_diff: Vec<DiffBlock>,
}

/// What happened to one page in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    /// First successful observation, recorded as the comparison point
    Baseline,
    Unchanged,
    /// Content differs from the previous snapshot
    Changed { blocks: usize },
    /// Nothing observed; snapshot and diff are untouched
    Failed(CheckFailure),
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Transition::Changed { .. })
    }

    pub fn failure(&self) -> Option<&CheckFailure> {
        match self {
            Transition::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Per-page outcome of a check cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    /// The record as it stands after the cycle, or as it was read if the write failed
    pub page: TrackedPage,
    pub transition: Transition,
}

/// Outcome of one full check cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages: Vec<PageReport>,
}

impl CycleReport {
    /// Pages whose content changed this cycle
    pub fn changed(&self) -> impl Iterator<Item = &PageReport> {
        self.pages.iter().filter(|r| r.transition.is_changed())
    }

    /// Pages that could not be checked, with the reason
    pub fn failed(&self) -> impl Iterator<Item = (&PageReport, &CheckFailure)> {
        self.pages
            .iter()
            .filter_map(|r| r.transition.failure().map(|f| (r, f)))
    }

    pub fn report_for(&self, id: Uuid) -> Option<&PageReport> {
        self.pages.iter().find(|r| r.page.id == id)
    }
}

//! Run reports
//!
//! Reports are the only thing a run hands back to its caller. They carry
//! counts plus one [`RecordOutcome`] per processed book, in store order.

use serde::Serialize;
use std::fmt;

use crate::model::BookId;

/// How one book fared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Updated,
    Linked,
    Skipped,
    Failed,
}

/// Per-book report entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub book_id: BookId,
    /// Display title of the local book
    pub title: String,
    pub status: OutcomeStatus,
    /// `label: old >> new` lines
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    /// Error text or link outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RecordOutcome {
    fn new(book_id: BookId, title: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            book_id,
            title: title.into(),
            status,
            changes: Vec::new(),
            detail: None,
        }
    }

    pub fn updated(book_id: BookId, title: impl Into<String>, changes: Vec<String>) -> Self {
        Self {
            changes,
            ..Self::new(book_id, title, OutcomeStatus::Updated)
        }
    }

    pub fn linked(book_id: BookId, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(book_id, title, OutcomeStatus::Linked).with_detail(detail)
    }

    pub fn skipped(book_id: BookId, title: impl Into<String>) -> Self {
        Self::new(book_id, title, OutcomeStatus::Skipped)
    }

    pub fn failed(book_id: BookId, title: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(book_id, title, OutcomeStatus::Failed).with_detail(error)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_changes(mut self, changes: Vec<String>) -> Self {
        self.changes = changes;
        self
    }
}

/// Result of a field sync run
///
/// Only linked books appear; `updated + skipped + failed == total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: Vec<RecordOutcome>,
}

impl SyncReport {
    pub fn push(&mut self, outcome: RecordOutcome) {
        self.total += 1;
        match outcome.status {
            OutcomeStatus::Updated | OutcomeStatus::Linked => self.updated += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.entries.push(outcome);
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total books processed: {}", self.total)?;
        writeln!(f, "Updated: {}", self.updated)?;
        writeln!(f, "Skipped: {}", self.skipped)?;
        write!(f, "Failed: {}", self.failed)
    }
}

/// Result of a linking pass (automatic or interactive)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub linked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: Vec<RecordOutcome>,
}

impl LinkReport {
    pub fn push(&mut self, outcome: RecordOutcome) {
        match outcome.status {
            OutcomeStatus::Linked | OutcomeStatus::Updated => self.linked += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.entries.push(outcome);
    }

    /// Books considered
    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Books linked: {}", self.linked)?;
        writeln!(f, "Books skipped: {}", self.skipped)?;
        write!(f, "Books failed: {}", self.failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_track_entries() {
        let mut report = SyncReport::default();
        report.push(RecordOutcome::updated(BookId(1), "A", vec!["X: - >> 1".into()]));
        report.push(RecordOutcome::skipped(BookId(2), "B"));
        report.push(RecordOutcome::failed(BookId(3), "C", "Book not found: u3"));

        assert_eq!(report.total, 3);
        assert_eq!(report.updated + report.skipped + report.failed, report.total);
        assert_eq!(
            report.to_string(),
            "Total books processed: 3\nUpdated: 1\nSkipped: 1\nFailed: 1"
        );
    }

    #[test]
    fn serialized_entry_omits_empty_parts() {
        let value = serde_json::to_value(RecordOutcome::skipped(BookId(2), "B")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"book_id": 2, "title": "B", "status": "skipped"})
        );
    }
}

//! Run statistics and outcome reporting.

use serde::{Deserialize, Serialize};

/// Overall outcome of a run. Conflicts are a distinguished outcome, not an
/// error: non-conflicting work still completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Clean,
    ConflictsDetected,
}

/// A per-record failure, attributed so the user can find the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    pub title: String,
    pub message: String,
}

/// Counts for one full reconciliation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub conflicted: usize,
    pub errored: usize,
    pub outcome: SyncOutcome,
    pub errors: Vec<RecordError>,
    pub dry_run: bool,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            created: 0,
            updated: 0,
            skipped: 0,
            conflicted: 0,
            errored: 0,
            outcome: SyncOutcome::Clean,
            errors: Vec::new(),
            dry_run,
        }
    }

    pub fn record_error(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.errored += 1;
        self.errors.push(RecordError {
            title: title.into(),
            message: message.into(),
        });
    }

    /// Process exit code: 0 clean, 2 conflicts need manual resolution.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            SyncOutcome::Clean => 0,
            SyncOutcome::ConflictsDetected => 2,
        }
    }

    /// Human-readable summary block.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str("Sync completed!\n");
        out.push_str(&format!("  Created:    {}\n", self.created));
        out.push_str(&format!("  Updated:    {}\n", self.updated));
        out.push_str(&format!("  Skipped:    {}\n", self.skipped));
        out.push_str(&format!("  Conflicted: {}\n", self.conflicted));
        out.push_str(&format!("  Errored:    {}\n", self.errored));
        for err in &self.errors {
            out.push_str(&format!("    {}: {}\n", err.title, err.message));
        }
        if self.conflicted > 0 {
            out.push_str(&format!(
                "\nConflicts need manual resolution; see the '{}' task.\n",
                crate::sync::conflict::CONFLICT_TASK_TITLE
            ));
        }
        if self.dry_run {
            out.push_str("\nDRY RUN MODE: No changes were applied\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_reflect_outcome() {
        let mut report = SyncReport::new(false);
        assert_eq!(report.exit_code(), 0);

        report.outcome = SyncOutcome::ConflictsDetected;
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn errors_are_attributed_to_records() {
        let mut report = SyncReport::new(false);
        report.record_error("Call Bob", "network unreachable");
        assert_eq!(report.errored, 1);
        assert!(report.summary().contains("Call Bob: network unreachable"));
    }

    #[test]
    fn dry_run_summary_carries_the_reminder() {
        let report = SyncReport::new(true);
        assert!(report.summary().contains("DRY RUN"));
        assert!(!SyncReport::new(false).summary().contains("DRY RUN"));
    }

    #[test]
    fn conflict_summary_points_at_the_task() {
        let mut report = SyncReport::new(false);
        report.conflicted = 1;
        report.outcome = SyncOutcome::ConflictsDetected;
        assert!(report.summary().contains("Resolve sync conflicts"));
    }
}

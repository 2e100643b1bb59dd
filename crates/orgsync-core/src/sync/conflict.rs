//! Conflict entries and the dedicated local conflict task.
//!
//! When both sides of a pair changed in incompatible ways, no winner is
//! guessed. The pair is withheld from mutation for the cycle and one dated
//! entry per pair lands in the detail section of a well-known local task,
//! where the user resolves it by hand. That task itself never syncs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{CompletionState, PriorityTier, TaskRecord};

/// Title of the dedicated local conflict task.
pub const CONFLICT_TASK_TITLE: &str = "Resolve sync conflicts";

/// Whether a title names the dedicated conflict task.
pub fn is_conflict_task(title: &str) -> bool {
    title == CONFLICT_TASK_TITLE
}

/// Both versions of a pair that could not be reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub detected_on: NaiveDate,
    pub local_title: String,
    pub remote_title: String,
    pub local_completion: CompletionState,
    pub remote_completion: CompletionState,
    pub local_priority: Option<PriorityTier>,
    pub remote_priority: Option<PriorityTier>,
}

impl ConflictEntry {
    pub fn from_pair(local: &TaskRecord, remote: &TaskRecord, detected_on: NaiveDate) -> Self {
        Self {
            detected_on,
            local_title: local.title.clone(),
            remote_title: remote.title.clone(),
            local_completion: local.completion,
            remote_completion: remote.completion,
            local_priority: local.priority,
            remote_priority: remote.priority,
        }
    }

    /// Markdown lines appended to the conflict task's detail section.
    pub fn render(&self) -> Vec<String> {
        vec![
            String::new(),
            format!("## {} {}", self.detected_on.format("%Y-%m-%d"), self.local_title),
            format!(
                "- local: \"{}\" {}",
                self.local_title,
                render_state(self.local_completion, self.local_priority)
            ),
            format!(
                "- remote: \"{}\" {}",
                self.remote_title,
                render_state(self.remote_completion, self.remote_priority)
            ),
        ]
    }
}

fn render_state(completion: CompletionState, priority: Option<PriorityTier>) -> String {
    let status = match completion {
        CompletionState::Open => "open",
        CompletionState::Completed => "completed",
    };
    match priority {
        Some(PriorityTier::High) => format!("[{status}, high]"),
        Some(PriorityTier::Normal) => format!("[{status}, normal]"),
        Some(PriorityTier::Low) => format!("[{status}, low]"),
        None => format!("[{status}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_records_both_versions() {
        let mut local = TaskRecord::new("Call Bob ASAP");
        local.priority = Some(PriorityTier::High);
        let remote = TaskRecord::new("Call Robert");

        let entry = ConflictEntry::from_pair(
            &local,
            &remote,
            NaiveDate::from_ymd_opt(2025, 11, 21).unwrap(),
        );
        let lines = entry.render();

        assert_eq!(lines[1], "## 2025-11-21 Call Bob ASAP");
        assert_eq!(lines[2], "- local: \"Call Bob ASAP\" [open, high]");
        assert_eq!(lines[3], "- remote: \"Call Robert\" [open]");
    }

    #[test]
    fn completed_state_is_spelled_out() {
        let mut local = TaskRecord::new("Ship it");
        local.completion = CompletionState::Completed;
        let remote = TaskRecord::new("Ship it now");

        let entry = ConflictEntry::from_pair(
            &local,
            &remote,
            NaiveDate::from_ymd_opt(2025, 11, 21).unwrap(),
        );
        assert!(entry.render()[2].contains("[completed]"));
    }

    #[test]
    fn conflict_task_title_is_recognized() {
        assert!(is_conflict_task(CONFLICT_TASK_TITLE));
        assert!(!is_conflict_task("Resolve sync conflicts later"));
    }
}

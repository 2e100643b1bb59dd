//! Canonical task representation shared by the local store and all backends.
//!
//! A [`TaskRecord`] is rebuilt from the adapters on every run; it is never
//! persisted on its own. Durable state lives in the orgplan file and in the
//! remote service, linked through per-backend identity markers.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Completion state as both sides understand it.
///
/// Local statuses are finer grained (delegated, canceled); the store collapses
/// them to `Completed` before records reach the reconciliation engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionState {
    /// Pending or unmarked
    Open,
    /// Done in any local flavor, or completed remotely
    Completed,
}

impl Default for CompletionState {
    fn default() -> Self {
        CompletionState::Open
    }
}

/// Priority tier, three-way across all backends that support priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    High,
    Normal,
    Low,
}

impl PriorityTier {
    /// Map an orgplan `#pN` level to a tier. Levels beyond 3 collapse to Low.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => PriorityTier::High,
            2 => PriorityTier::Normal,
            _ => PriorityTier::Low,
        }
    }

    /// The `#pN` level this tier renders as locally.
    pub fn level(&self) -> u8 {
        match self {
            PriorityTier::High => 1,
            PriorityTier::Normal => 2,
            PriorityTier::Low => 3,
        }
    }
}

/// Backend-agnostic task record.
///
/// `title` is the normalized description: status blocks, priority/auxiliary
/// tags and due markers stripped. It is the fallback identity and is compared
/// case-sensitively and exactly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    pub title: String,
    pub completion: CompletionState,
    /// `None` means no priority asserted. A backend without priority support
    /// always reports `None` and must never be made to assert a tier.
    pub priority: Option<PriorityTier>,
    /// Calendar date only; none of the supported stores keep a time of day.
    pub due_date: Option<NaiveDate>,
    /// Free-text notes. Once non-empty on the local side, remote edits never
    /// overwrite it.
    pub detail: Option<String>,
    /// Auxiliary markers (`#3h`, `#blocked`, custom tags). Preserved verbatim
    /// locally, never transmitted to a backend.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Identity-marker name (e.g. `ms-todo-id`) → opaque backend-issued id.
    /// Zero, one or two entries; immutable once assigned.
    #[serde(default)]
    pub identities: BTreeMap<String, String>,
}

impl TaskRecord {
    /// A fresh open record with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// The identity this record carries for `backend`, if any.
    pub fn identity(&self, backend: &str) -> Option<&str> {
        self.identities.get(backend).map(String::as_str)
    }

    /// Builder-style identity attachment.
    pub fn with_identity(mut self, backend: &str, id: impl Into<String>) -> Self {
        self.identities.insert(backend.to_string(), id.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.completion == CompletionState::Completed
    }

    /// Whether the detail body carries any content.
    pub fn has_detail(&self) -> bool {
        self.detail.as_deref().is_some_and(|d| !d.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_levels_collapse_to_low() {
        assert_eq!(PriorityTier::from_level(1), PriorityTier::High);
        assert_eq!(PriorityTier::from_level(2), PriorityTier::Normal);
        assert_eq!(PriorityTier::from_level(3), PriorityTier::Low);
        assert_eq!(PriorityTier::from_level(7), PriorityTier::Low);
    }

    #[test]
    fn priority_level_round_trip() {
        for tier in [PriorityTier::High, PriorityTier::Normal, PriorityTier::Low] {
            assert_eq!(PriorityTier::from_level(tier.level()), tier);
        }
    }

    #[test]
    fn identities_coexist_per_backend() {
        let record = TaskRecord::new("Buy milk")
            .with_identity("microsoft", "ms-123")
            .with_identity("google", "g-456");

        assert_eq!(record.identity("microsoft"), Some("ms-123"));
        assert_eq!(record.identity("google"), Some("g-456"));
        assert_eq!(record.identity("other"), None);
    }

    #[test]
    fn whitespace_detail_counts_as_empty() {
        let mut record = TaskRecord::new("Call Bob");
        assert!(!record.has_detail());

        record.detail = Some("   \n".into());
        assert!(!record.has_detail());

        record.detail = Some("notes".into());
        assert!(record.has_detail());
    }
}

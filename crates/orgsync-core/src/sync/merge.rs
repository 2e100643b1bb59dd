//! Field-level diff and merge decisions for matched pairs.
//!
//! Rules per field:
//! - title: no last-known-good snapshot survives between runs, so any
//!   mismatch is a conflict input, never an automatic winner
//! - completion: completed dominates open, in either direction
//! - priority: only on backends that support it; a tier asserted on exactly
//!   one side is adopted by the other; two different asserted tiers are a
//!   conflict input
//! - due date: a local due date wins; a remote due date is adopted only when
//!   the local side has none
//! - detail: one-directional and sticky; non-empty local detail is never
//!   overwritten, empty local detail adopts non-empty remote detail
//! - identity: a title-matched pair leaves a marker on the local side

use chrono::NaiveDate;

use crate::backend::Capabilities;
use crate::record::{CompletionState, PriorityTier, TaskRecord};
use crate::sync::conflict::ConflictEntry;

/// Changes destined for the local store, applied field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalPatch {
    pub complete: bool,
    pub priority: Option<PriorityTier>,
    pub due_date: Option<NaiveDate>,
    pub detail: Option<String>,
}

impl LocalPatch {
    pub fn is_empty(&self) -> bool {
        !self.complete && self.priority.is_none() && self.due_date.is_none() && self.detail.is_none()
    }
}

/// Everything a matched pair needs applied.
#[derive(Debug, Clone, Default)]
pub struct PairPlan {
    /// Full desired remote record (identity included), when the remote side
    /// needs an update.
    pub remote_update: Option<TaskRecord>,
    /// Local field changes, when the local side needs an update.
    pub local_patch: Option<LocalPatch>,
    /// Identity to persist locally, when the pair matched by title.
    pub ensure_identity: Option<String>,
}

impl PairPlan {
    pub fn is_empty(&self) -> bool {
        self.remote_update.is_none() && self.local_patch.is_none() && self.ensure_identity.is_none()
    }
}

/// Outcome for one matched pair.
#[derive(Debug, Clone)]
pub enum PairOutcome {
    /// Both sides already agree.
    Clean,
    /// Apply these changes.
    Apply(PairPlan),
    /// Incompatible simultaneous edits; withhold all mutation.
    Conflict(ConflictEntry),
}

/// Decide what a matched pair needs.
pub fn evaluate_pair(
    local: &TaskRecord,
    remote: &TaskRecord,
    caps: Capabilities,
    id_marker: &str,
    today: NaiveDate,
) -> PairOutcome {
    // Title mismatch is a conflict input outright (see module docs).
    if local.title != remote.title {
        return PairOutcome::Conflict(ConflictEntry::from_pair(local, remote, today));
    }

    let mut desired = remote.clone();
    let mut remote_changed = false;
    let mut patch = LocalPatch::default();

    // Completion: completed dominates in either direction.
    match (local.completion, remote.completion) {
        (CompletionState::Completed, CompletionState::Open) => {
            desired.completion = CompletionState::Completed;
            remote_changed = true;
        }
        (CompletionState::Open, CompletionState::Completed) => {
            patch.complete = true;
        }
        _ => {}
    }

    // Priority: only meaningful when the backend has the concept. Normal is
    // the remote resting state (adapters read it back as no assertion), so
    // pushing it would re-issue the same update forever.
    if caps.supports_priority {
        match (local.priority, remote.priority) {
            (Some(l), Some(r)) if l != r => {
                return PairOutcome::Conflict(ConflictEntry::from_pair(local, remote, today));
            }
            (Some(l), None) if l != PriorityTier::Normal => {
                desired.priority = Some(l);
                remote_changed = true;
            }
            (None, Some(r)) => {
                patch.priority = Some(r);
            }
            _ => {}
        }
    }

    // Due date: local wins when asserted; otherwise adopt the remote one.
    match (local.due_date, remote.due_date) {
        (Some(l), r) if r != Some(l) => {
            desired.due_date = Some(l);
            remote_changed = true;
        }
        (None, Some(r)) => {
            patch.due_date = Some(r);
        }
        _ => {}
    }

    // Detail: sticky local precedence.
    if !local.has_detail() && remote.has_detail() {
        patch.detail = remote.detail.clone();
    }

    let plan = PairPlan {
        remote_update: remote_changed.then_some(desired),
        local_patch: (!patch.is_empty()).then_some(patch),
        ensure_identity: match local.identity(id_marker) {
            None => remote.identity(id_marker).map(String::from),
            Some(_) => None,
        },
    };

    if plan.is_empty() {
        PairOutcome::Clean
    } else {
        PairOutcome::Apply(plan)
    }
}

/// Record to create on the remote side for a local-only task. Backends
/// without priority receive no tier; tags never travel.
pub fn record_for_remote_creation(local: &TaskRecord, caps: Capabilities) -> TaskRecord {
    TaskRecord {
        title: local.title.clone(),
        completion: local.completion,
        priority: if caps.supports_priority {
            local.priority
        } else {
            None
        },
        due_date: local.due_date,
        detail: local.detail.clone(),
        tags: Vec::new(),
        identities: Default::default(),
    }
}

/// Record to create locally for a remote-only task.
pub fn record_for_local_creation(remote: &TaskRecord, caps: Capabilities) -> TaskRecord {
    TaskRecord {
        title: remote.title.clone(),
        completion: remote.completion,
        priority: if caps.supports_priority {
            remote.priority
        } else {
            None
        },
        due_date: remote.due_date,
        detail: remote.detail.clone(),
        tags: Vec::new(),
        identities: remote.identities.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "ms-todo-id";
    const WITH_PRIORITY: Capabilities = Capabilities {
        supports_priority: true,
    };
    const NO_PRIORITY: Capabilities = Capabilities {
        supports_priority: false,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 21).unwrap()
    }

    fn pair(title: &str) -> (TaskRecord, TaskRecord) {
        let local = TaskRecord::new(title).with_identity(MARKER, "id-1");
        let remote = TaskRecord::new(title).with_identity(MARKER, "id-1");
        (local, remote)
    }

    fn expect_apply(outcome: PairOutcome) -> PairPlan {
        match outcome {
            PairOutcome::Apply(plan) => plan,
            other => panic!("expected Apply, got {other:?}"),
        }
    }

    #[test]
    fn identical_pair_is_clean() {
        let (local, remote) = pair("Call Bob");
        assert!(matches!(
            evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()),
            PairOutcome::Clean
        ));
    }

    #[test]
    fn title_mismatch_is_a_conflict() {
        let (mut local, mut remote) = pair("Call Bob");
        local.title = "Call Bob ASAP".into();
        remote.title = "Call Robert".into();

        match evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()) {
            PairOutcome::Conflict(entry) => {
                assert_eq!(entry.local_title, "Call Bob ASAP");
                assert_eq!(entry.remote_title, "Call Robert");
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn local_completed_pushes_to_remote() {
        let (mut local, remote) = pair("Call Bob");
        local.completion = CompletionState::Completed;

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(
            plan.remote_update.unwrap().completion,
            CompletionState::Completed
        );
        assert!(plan.local_patch.is_none());
    }

    #[test]
    fn remote_completed_pushes_to_local() {
        let (local, mut remote) = pair("Call Bob");
        remote.completion = CompletionState::Completed;

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert!(plan.remote_update.is_none());
        assert!(plan.local_patch.unwrap().complete);
    }

    #[test]
    fn single_sided_priority_is_adopted() {
        // Local asserts, remote silent: remote adopts.
        let (mut local, remote) = pair("Ship it");
        local.priority = Some(PriorityTier::High);
        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(
            plan.remote_update.unwrap().priority,
            Some(PriorityTier::High)
        );

        // Remote asserts, local silent: local adopts.
        let (local, mut remote) = pair("Ship it");
        remote.priority = Some(PriorityTier::Low);
        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(
            plan.local_patch.unwrap().priority,
            Some(PriorityTier::Low)
        );
    }

    #[test]
    fn normal_tier_against_silent_remote_is_a_wire_noop() {
        // Graph reads "normal" back as no assertion; pushing it would never
        // converge.
        let (mut local, remote) = pair("Ship it");
        local.priority = Some(PriorityTier::Normal);
        assert!(matches!(
            evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()),
            PairOutcome::Clean
        ));
    }

    #[test]
    fn two_asserted_tiers_conflict() {
        let (mut local, mut remote) = pair("Ship it");
        local.priority = Some(PriorityTier::High);
        remote.priority = Some(PriorityTier::Low);

        assert!(matches!(
            evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()),
            PairOutcome::Conflict(_)
        ));
    }

    #[test]
    fn priority_is_ignored_without_backend_support() {
        let (mut local, remote) = pair("Ship it");
        local.priority = Some(PriorityTier::High);

        assert!(matches!(
            evaluate_pair(&local, &remote, NO_PRIORITY, MARKER, today()),
            PairOutcome::Clean
        ));
    }

    #[test]
    fn local_due_date_wins() {
        let (mut local, mut remote) = pair("Pay rent");
        local.due_date = NaiveDate::from_ymd_opt(2025, 12, 1);
        remote.due_date = NaiveDate::from_ymd_opt(2025, 12, 5);

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(
            plan.remote_update.unwrap().due_date,
            NaiveDate::from_ymd_opt(2025, 12, 1)
        );
        assert!(plan.local_patch.is_none());
    }

    #[test]
    fn remote_due_date_is_adopted_when_local_has_none() {
        let (local, mut remote) = pair("Pay rent");
        remote.due_date = NaiveDate::from_ymd_opt(2025, 12, 5);

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(
            plan.local_patch.unwrap().due_date,
            NaiveDate::from_ymd_opt(2025, 12, 5)
        );
    }

    #[test]
    fn empty_local_detail_adopts_remote() {
        let (local, mut remote) = pair("Research");
        remote.detail = Some("Links in the doc".into());

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(
            plan.local_patch.unwrap().detail.as_deref(),
            Some("Links in the doc")
        );
    }

    #[test]
    fn non_empty_local_detail_is_never_overwritten() {
        let (mut local, mut remote) = pair("Research");
        local.detail = Some("My notes".into());
        remote.detail = Some("Different remote notes".into());

        assert!(matches!(
            evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()),
            PairOutcome::Clean
        ));
    }

    #[test]
    fn title_matched_pair_ensures_identity() {
        let local = TaskRecord::new("Buy milk");
        let remote = TaskRecord::new("Buy milk").with_identity(MARKER, "id-9");

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        assert_eq!(plan.ensure_identity.as_deref(), Some("id-9"));
        assert!(plan.remote_update.is_none());
        assert!(plan.local_patch.is_none());
    }

    #[test]
    fn remote_update_keeps_remote_detail_untouched() {
        let (mut local, mut remote) = pair("Ship it");
        local.completion = CompletionState::Completed;
        local.detail = Some("local notes".into());
        remote.detail = Some("remote notes".into());

        let plan = expect_apply(evaluate_pair(&local, &remote, WITH_PRIORITY, MARKER, today()));
        // The desired record starts from the remote one, so the remote's own
        // notes ride along unchanged.
        assert_eq!(
            plan.remote_update.unwrap().detail.as_deref(),
            Some("remote notes")
        );
    }

    #[test]
    fn creation_records_strip_priority_for_non_supporting_backends() {
        let mut local = TaskRecord::new("Ship it");
        local.priority = Some(PriorityTier::High);
        local.tags = vec!["#3h".into()];

        let for_remote = record_for_remote_creation(&local, NO_PRIORITY);
        assert_eq!(for_remote.priority, None);
        assert!(for_remote.tags.is_empty());

        let for_remote = record_for_remote_creation(&local, WITH_PRIORITY);
        assert_eq!(for_remote.priority, Some(PriorityTier::High));
    }

    #[test]
    fn local_creation_record_carries_remote_identity() {
        let remote = TaskRecord::new("From remote").with_identity(MARKER, "id-7");
        let record = record_for_local_creation(&remote, WITH_PRIORITY);
        assert_eq!(record.identity(MARKER), Some("id-7"));
    }
}

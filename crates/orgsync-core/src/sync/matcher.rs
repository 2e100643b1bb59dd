//! Pairing of local and remote records for one backend.
//!
//! Two passes: identity first, then exact normalized-title fallback. Absence
//! of a match is a normal outcome, never an error. The dedicated conflict
//! task is excluded on both sides; it belongs to the resolver, not the sync.

use std::collections::HashMap;

use crate::record::TaskRecord;
use crate::sync::conflict;

/// One local/remote pair. Indices refer to the input slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub local: usize,
    pub remote: usize,
}

/// Outcome of matching one backend's record sets.
#[derive(Debug, Default)]
pub struct MatchSet {
    /// Pairs in local enumeration order.
    pub pairs: Vec<MatchedPair>,
    /// Local records with no partner: candidates for remote creation.
    pub local_only: Vec<usize>,
    /// Remote records with no partner: candidates for local creation.
    pub remote_only: Vec<usize>,
    /// Remote-only records dropped as stale carry-over (already completed).
    pub dropped_stale: Vec<usize>,
}

/// Match `local` against `remote`. `id_marker` is the backend's identity
/// marker name; identities are looked up under that key.
///
/// Fallback tie-break: when several remote records share a title, the first
/// in backend enumeration order wins and the rest stay unmatched. This can
/// surface a visible duplicate; it is a documented tie-break, not resolved
/// ambiguity.
pub fn match_records(local: &[TaskRecord], remote: &[TaskRecord], id_marker: &str) -> MatchSet {
    let mut set = MatchSet::default();
    let mut remote_used = vec![false; remote.len()];

    let remote_by_id: HashMap<&str, usize> = remote
        .iter()
        .enumerate()
        .filter_map(|(j, r)| r.identity(id_marker).map(|id| (id, j)))
        .collect();

    let eligible = |record: &TaskRecord| !conflict::is_conflict_task(&record.title);

    // Pass 1: identity.
    let mut local_matched = vec![false; local.len()];
    for (i, l) in local.iter().enumerate() {
        if !eligible(l) {
            local_matched[i] = true; // out of the game entirely
            continue;
        }
        if let Some(&j) = l.identity(id_marker).and_then(|id| remote_by_id.get(id)) {
            if !remote_used[j] {
                set.pairs.push(MatchedPair { local: i, remote: j });
                local_matched[i] = true;
                remote_used[j] = true;
            }
        }
    }

    // Pass 2: exact title, first unused remote in enumeration order.
    for (i, l) in local.iter().enumerate() {
        if local_matched[i] {
            continue;
        }
        let found = remote
            .iter()
            .enumerate()
            .find(|(j, r)| !remote_used[*j] && eligible(r) && r.title == l.title);
        if let Some((j, _)) = found {
            set.pairs.push(MatchedPair { local: i, remote: j });
            local_matched[i] = true;
            remote_used[j] = true;
        }
    }

    set.pairs.sort_by_key(|p| p.local);

    for (i, l) in local.iter().enumerate() {
        if !local_matched[i] && eligible(l) {
            set.local_only.push(i);
        }
    }

    for (j, r) in remote.iter().enumerate() {
        if remote_used[j] || !eligible(r) {
            continue;
        }
        if r.is_completed() {
            // Stale carry-over from a prior period; never re-examined.
            tracing::debug!("dropping stale completed remote task: {}", r.title);
            set.dropped_stale.push(j);
        } else {
            set.remote_only.push(j);
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CompletionState;

    const MARKER: &str = "ms-todo-id";

    fn local(title: &str) -> TaskRecord {
        TaskRecord::new(title)
    }

    fn remote(title: &str, id: &str) -> TaskRecord {
        TaskRecord::new(title).with_identity(MARKER, id)
    }

    #[test]
    fn identity_match_beats_title() {
        let locals = vec![local("Renamed locally").with_identity(MARKER, "id-1")];
        let remotes = vec![
            remote("Renamed locally", "id-other"),
            remote("Old title", "id-1"),
        ];
        let set = match_records(&locals, &remotes, MARKER);
        assert_eq!(set.pairs, vec![MatchedPair { local: 0, remote: 1 }]);
    }

    #[test]
    fn title_fallback_pairs_unidentified_records() {
        let locals = vec![local("Buy milk")];
        let remotes = vec![remote("Buy milk", "id-9")];
        let set = match_records(&locals, &remotes, MARKER);
        assert_eq!(set.pairs, vec![MatchedPair { local: 0, remote: 0 }]);
        assert!(set.local_only.is_empty());
        assert!(set.remote_only.is_empty());
    }

    #[test]
    fn title_comparison_is_case_sensitive() {
        let locals = vec![local("buy milk")];
        let remotes = vec![remote("Buy milk", "id-9")];
        let set = match_records(&locals, &remotes, MARKER);
        assert!(set.pairs.is_empty());
        assert_eq!(set.local_only, vec![0]);
        assert_eq!(set.remote_only, vec![0]);
    }

    #[test]
    fn duplicate_remote_titles_pick_first_and_leave_rest() {
        let locals = vec![local("Buy milk")];
        let remotes = vec![remote("Buy milk", "id-a"), remote("Buy milk", "id-b")];
        let set = match_records(&locals, &remotes, MARKER);
        assert_eq!(set.pairs, vec![MatchedPair { local: 0, remote: 0 }]);
        assert_eq!(set.remote_only, vec![1]);
    }

    #[test]
    fn completed_remote_only_records_are_dropped() {
        let mut stale = remote("Done last month", "id-old");
        stale.completion = CompletionState::Completed;
        let remotes = vec![stale, remote("Still open", "id-new")];

        let set = match_records(&[], &remotes, MARKER);
        assert_eq!(set.dropped_stale, vec![0]);
        assert_eq!(set.remote_only, vec![1]);
    }

    #[test]
    fn completed_matched_remote_records_are_kept() {
        let locals = vec![local("Call Bob")];
        let mut done = remote("Call Bob", "id-1");
        done.completion = CompletionState::Completed;

        let set = match_records(&locals, &[done], MARKER);
        assert_eq!(set.pairs.len(), 1);
        assert!(set.dropped_stale.is_empty());
    }

    #[test]
    fn conflict_task_is_excluded_on_both_sides() {
        let locals = vec![local(conflict::CONFLICT_TASK_TITLE), local("Real task")];
        let remotes = vec![remote(conflict::CONFLICT_TASK_TITLE, "id-x")];

        let set = match_records(&locals, &remotes, MARKER);
        assert!(set.pairs.is_empty());
        assert_eq!(set.local_only, vec![1]);
        assert!(set.remote_only.is_empty());
        assert!(set.dropped_stale.is_empty());
    }

    #[test]
    fn identity_from_another_backend_does_not_match() {
        let locals = vec![local("Task").with_identity("google-tasks-id", "g-1")];
        let remotes = vec![remote("Other title", "g-1")];
        let set = match_records(&locals, &remotes, MARKER);
        // The google id means nothing to the microsoft marker lookup; the
        // titles differ, so nothing pairs.
        assert!(set.pairs.is_empty());
    }

    #[test]
    fn pairs_come_out_in_local_enumeration_order() {
        let locals = vec![
            local("B").with_identity(MARKER, "id-b"),
            local("A"),
            local("C").with_identity(MARKER, "id-c"),
        ];
        let remotes = vec![
            remote("A", "id-a"),
            remote("C", "id-c"),
            remote("B", "id-b"),
        ];
        let set = match_records(&locals, &remotes, MARKER);
        let order: Vec<usize> = set.pairs.iter().map(|p| p.local).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }
}

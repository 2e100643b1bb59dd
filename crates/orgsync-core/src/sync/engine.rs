//! Sync orchestrator: one full reconciliation cycle.
//!
//! Phases run strictly once, in order; there is no replay. Transient remote
//! failures are retried inside the backend per call, and a failure on one
//! record never aborts the cycle: it is recorded in the report and the cycle
//! moves on. Every local mutation is followed by an incremental write-back so
//! an interrupted run leaves both stores consistent and resumable.

use chrono::Local;

use crate::backend::TaskBackend;
use crate::error::SyncError;
use crate::record::TaskRecord;
use crate::store::OrgplanStore;
use crate::sync::conflict::{ConflictEntry, CONFLICT_TASK_TITLE};
use crate::sync::matcher::{self, MatchedPair};
use crate::sync::merge::{self, PairOutcome, PairPlan};
use crate::sync::report::{SyncOutcome, SyncReport};

/// Orchestrator phase. `Failed` is terminal and reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Loading,
    Matching,
    Merging,
    Applying,
    Reporting,
    Done,
    Failed,
}

/// One reconciliation cycle between an orgplan store and a remote list.
pub struct SyncEngine<'a> {
    store: &'a mut OrgplanStore,
    backend: &'a dyn TaskBackend,
    list_id: String,
    dry_run: bool,
    phase: SyncPhase,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        store: &'a mut OrgplanStore,
        backend: &'a dyn TaskBackend,
        list_id: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            backend,
            list_id: list_id.into(),
            dry_run,
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Run the cycle. An error before Loading completes produces no report;
    /// everything after that is absorbed into the report per record.
    pub fn run(&mut self) -> Result<SyncReport, SyncError> {
        self.phase = SyncPhase::Loading;
        let local = self.store.records();
        tracing::info!("loaded {} local tasks", local.len());

        let remote = match self.backend.list_tasks(&self.list_id) {
            Ok(remote) => remote,
            Err(err) => {
                self.phase = SyncPhase::Failed;
                return Err(err.into());
            }
        };
        tracing::info!("loaded {} remote tasks", remote.len());

        self.phase = SyncPhase::Matching;
        let marker = self.backend.id_marker();
        let caps = self.backend.capabilities();
        let matches = matcher::match_records(&local, &remote, marker);
        tracing::info!(
            "matched {} pairs, {} local-only, {} remote-only, {} stale dropped",
            matches.pairs.len(),
            matches.local_only.len(),
            matches.remote_only.len(),
            matches.dropped_stale.len()
        );

        self.phase = SyncPhase::Merging;
        let today = Local::now().date_naive();
        let outcomes: Vec<(MatchedPair, PairOutcome)> = matches
            .pairs
            .iter()
            .map(|&pair| {
                let outcome = merge::evaluate_pair(
                    &local[pair.local],
                    &remote[pair.remote],
                    caps,
                    marker,
                    today,
                );
                (pair, outcome)
            })
            .collect();

        self.phase = SyncPhase::Applying;
        let mut report = SyncReport::new(self.dry_run);
        let mut conflicts: Vec<ConflictEntry> = Vec::new();

        for (pair, outcome) in outcomes {
            let title = &local[pair.local].title;
            match outcome {
                PairOutcome::Clean => {
                    tracing::debug!("'{title}' is up to date");
                    report.skipped += 1;
                }
                PairOutcome::Conflict(entry) => {
                    tracing::warn!(
                        "conflict on '{title}': local '{}' vs remote '{}'",
                        entry.local_title,
                        entry.remote_title
                    );
                    report.conflicted += 1;
                    conflicts.push(entry);
                }
                PairOutcome::Apply(plan) => {
                    tracing::info!("updating '{title}'");
                    if self.dry_run {
                        report.updated += 1;
                    } else {
                        match self.apply_pair(pair.local, &plan, marker) {
                            Ok(()) => report.updated += 1,
                            Err(message) => {
                                tracing::error!("failed to update '{title}': {message}");
                                report.record_error(title.clone(), message);
                            }
                        }
                    }
                }
            }
        }

        for &i in &matches.local_only {
            let title = &local[i].title;
            tracing::info!("creating remotely: '{title}'");
            if self.dry_run {
                report.created += 1;
                continue;
            }
            match self.create_remote(i, &local[i], marker, caps) {
                Ok(()) => report.created += 1,
                Err(message) => {
                    tracing::error!("failed to create '{title}' remotely: {message}");
                    report.record_error(title.clone(), message);
                }
            }
        }

        for &j in &matches.remote_only {
            let title = &remote[j].title;
            tracing::info!("creating locally: '{title}'");
            if self.dry_run {
                report.created += 1;
                continue;
            }
            match self.create_local(&remote[j], marker, caps) {
                Ok(()) => report.created += 1,
                Err(message) => {
                    tracing::error!("failed to create '{title}' locally: {message}");
                    report.record_error(title.clone(), message);
                }
            }
        }

        report.skipped += matches.dropped_stale.len();

        if !conflicts.is_empty() {
            report.outcome = SyncOutcome::ConflictsDetected;
            if !self.dry_run {
                if let Err(message) = self.record_conflicts(&conflicts) {
                    report.record_error(CONFLICT_TASK_TITLE, message);
                }
            }
        }

        self.phase = SyncPhase::Reporting;
        tracing::info!(
            "cycle finished: {} created, {} updated, {} skipped, {} conflicted, {} errored",
            report.created,
            report.updated,
            report.skipped,
            report.conflicted,
            report.errored
        );

        self.phase = SyncPhase::Done;
        Ok(report)
    }

    /// Apply one pair's plan. Remote first, then local, then write-back, so a
    /// remote failure leaves the local side untouched.
    fn apply_pair(&mut self, local_idx: usize, plan: &PairPlan, marker: &str) -> Result<(), String> {
        if let Some(desired) = &plan.remote_update {
            self.backend
                .update_task(&self.list_id, desired)
                .map_err(|e| e.to_string())?;
        }

        let mut local_changed = false;
        if let Some(patch) = &plan.local_patch {
            if patch.complete {
                self.store.mark_completed(local_idx).map_err(|e| e.to_string())?;
                local_changed = true;
            }
            if let Some(tier) = patch.priority {
                self.store
                    .set_priority(local_idx, tier)
                    .map_err(|e| e.to_string())?;
                local_changed = true;
            }
            if let Some(due) = patch.due_date {
                self.store.set_due(local_idx, due).map_err(|e| e.to_string())?;
                local_changed = true;
            }
            if let Some(detail) = &patch.detail {
                self.store
                    .set_detail(local_idx, detail)
                    .map_err(|e| e.to_string())?;
                local_changed = true;
            }
        }
        if let Some(id) = &plan.ensure_identity {
            self.store
                .ensure_identity(local_idx, marker, id)
                .map_err(|e| e.to_string())?;
            local_changed = true;
        }

        if local_changed {
            self.store.write_back().map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Create a local-only task remotely and persist the assigned identity
    /// immediately, so an interrupted run never recreates it.
    fn create_remote(
        &mut self,
        local_idx: usize,
        local: &TaskRecord,
        marker: &str,
        caps: crate::backend::Capabilities,
    ) -> Result<(), String> {
        let record = merge::record_for_remote_creation(local, caps);
        let created = self
            .backend
            .create_task(&self.list_id, &record)
            .map_err(|e| e.to_string())?;
        let id = created
            .identity(marker)
            .ok_or_else(|| "backend returned no identity for created task".to_string())?;

        self.store
            .ensure_identity(local_idx, marker, id)
            .map_err(|e| e.to_string())?;
        self.store.write_back().map_err(|e| e.to_string())?;
        tracing::debug!("created remote task '{}' with id {id}", local.title);
        Ok(())
    }

    /// Create a remote-only task in the orgplan file, identity marker
    /// included.
    fn create_local(
        &mut self,
        remote: &TaskRecord,
        marker: &str,
        caps: crate::backend::Capabilities,
    ) -> Result<(), String> {
        let record = merge::record_for_local_creation(remote, caps);
        let id = remote
            .identity(marker)
            .ok_or_else(|| "remote record has no identity".to_string())?;
        self.store
            .append_task(&record, &[(marker.to_string(), id.to_string())])
            .map_err(|e| e.to_string())?;
        self.store.write_back().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Upsert the conflict task and append this run's entries.
    fn record_conflicts(&mut self, conflicts: &[ConflictEntry]) -> Result<(), String> {
        let idx = match self.store.find_by_title(CONFLICT_TASK_TITLE) {
            Some(idx) => idx,
            None => self
                .store
                .append_task(&TaskRecord::new(CONFLICT_TASK_TITLE), &[])
                .map_err(|e| e.to_string())?,
        };

        for entry in conflicts {
            self.store
                .append_detail_lines(idx, &entry.render())
                .map_err(|e| e.to_string())?;
        }
        self.store.write_back().map_err(|e| e.to_string())?;
        Ok(())
    }
}

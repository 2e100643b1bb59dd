//! Bidirectional reconciliation: matcher, diff/merge, conflict resolver,
//! orchestrator and run reporting.

pub mod conflict;
pub mod engine;
pub mod matcher;
pub mod merge;
pub mod report;

pub use conflict::{ConflictEntry, CONFLICT_TASK_TITLE};
pub use engine::{SyncEngine, SyncPhase};
pub use matcher::{match_records, MatchSet, MatchedPair};
pub use merge::{evaluate_pair, LocalPatch, PairOutcome, PairPlan};
pub use report::{RecordError, SyncOutcome, SyncReport};

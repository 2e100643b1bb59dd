//! # orgsync Core Library
//!
//! Bidirectional reconciliation between a plain-text orgplan task list and a
//! remote cloud task service (Microsoft To Do or Google Tasks). The CLI
//! binary is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Record model**: one canonical [`TaskRecord`] shared by both sides,
//!   with explicit optional fields and a per-backend identity map
//! - **Local store**: parses and writes the orgplan markdown file, with
//!   idempotent incremental write-back
//! - **Backends**: [`TaskBackend`] implementations for Microsoft To Do
//!   (Graph API) and Google Tasks, capability-described
//! - **Sync**: matcher, field-level diff/merge, conflict resolver and the
//!   single-pass orchestrator
//!
//! ## Key Components
//!
//! - [`SyncEngine`]: one full reconciliation cycle
//! - [`OrgplanStore`]: the local markdown store
//! - [`TaskBackend`]: trait implemented by every remote service
//! - [`Config`]: file + environment configuration
//! - [`SyncLock`]: run-scoped advisory file lock

pub mod backend;
pub mod config;
pub mod error;
pub mod lock;
pub mod record;
pub mod retry;
pub mod store;
pub mod sync;
pub mod token;

pub use backend::{create_backend, Capabilities, TaskBackend, TaskList};
pub use config::Config;
pub use error::{BackendError, ConfigError, LockError, StoreError, SyncError};
pub use lock::{SyncLock, SyncLockGuard};
pub use record::{CompletionState, PriorityTier, TaskRecord};
pub use store::OrgplanStore;
pub use sync::{SyncEngine, SyncOutcome, SyncPhase, SyncReport, CONFLICT_TASK_TITLE};
pub use token::{OAuthTokens, TokenStorage};

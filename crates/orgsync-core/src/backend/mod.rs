//! Remote task backends.
//!
//! Every backend implements [`TaskBackend`]; the engine only sees that trait
//! plus the capability flags. Backends are stateless between calls apart from
//! the access token obtained in `authenticate`.

pub mod google;
mod http;
pub mod microsoft;
pub mod oauth;

use crate::config::Config;
use crate::error::{BackendError, ConfigError, SyncError};
use crate::record::TaskRecord;
use crate::token::TokenStorage;

pub use google::GoogleTasksBackend;
pub use microsoft::MicrosoftTodoBackend;

/// What a backend can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Whether the backend has a priority/importance concept. A backend
    /// without it never has a tier asserted on its records.
    pub supports_priority: bool,
}

/// A remote task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskList {
    pub id: String,
    pub name: String,
}

/// Interface every remote task service implements.
pub trait TaskBackend {
    /// Unique identifier (e.g. "microsoft", "google").
    fn name(&self) -> &str;

    /// Identity-marker name embedded in orgplan detail sections
    /// (e.g. "ms-todo-id"). Distinct per backend so several backends can
    /// coexist on one task.
    fn id_marker(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Whether stored credentials exist for this backend.
    fn is_authenticated(&self) -> bool;

    /// Obtain a usable access token, refreshing or prompting as allowed.
    fn authenticate(&mut self) -> Result<(), BackendError>;

    /// Remove stored credentials.
    fn disconnect(&mut self) -> Result<(), BackendError>;

    /// All task lists on the account.
    fn task_lists(&self) -> Result<Vec<TaskList>, BackendError>;

    /// Task list by display name.
    fn find_list(&self, name: &str) -> Result<Option<TaskList>, BackendError> {
        Ok(self.task_lists()?.into_iter().find(|l| l.name == name))
    }

    /// All tasks in a list, in backend enumeration order. Each record carries
    /// its backend id under `id_marker()`.
    fn list_tasks(&self, list_id: &str) -> Result<Vec<TaskRecord>, BackendError>;

    /// Create a task; the returned record carries the assigned identity.
    fn create_task(&self, list_id: &str, record: &TaskRecord) -> Result<TaskRecord, BackendError>;

    /// Update a task; `record` must carry the identity under `id_marker()`.
    fn update_task(&self, list_id: &str, record: &TaskRecord) -> Result<TaskRecord, BackendError>;
}

/// Build the backend selected by `config.backend`.
pub fn create_backend(
    config: &Config,
    tokens: TokenStorage,
    allow_prompt: bool,
) -> Result<Box<dyn TaskBackend>, SyncError> {
    match config.backend.as_str() {
        "microsoft" => Ok(Box::new(MicrosoftTodoBackend::new(
            &config.microsoft,
            tokens,
            allow_prompt,
        )?)),
        "google" => Ok(Box::new(GoogleTasksBackend::new(
            &config.google,
            tokens,
            allow_prompt,
        )?)),
        other => Err(ConfigError::UnknownBackend(other.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_unknown_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            backend: "todoist".into(),
            ..Default::default()
        };
        let tokens = TokenStorage::new(dir.path());
        match create_backend(&config, tokens, false) {
            Err(SyncError::Config(ConfigError::UnknownBackend(name))) => {
                assert_eq!(name, "todoist")
            }
            other => panic!("expected UnknownBackend, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn factory_builds_both_backends() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.microsoft.client_id = "cid".into();
        config.microsoft.tenant_id = "tid".into();
        config.google.client_id = "gcid".into();
        config.google.client_secret = "gsec".into();

        config.backend = "microsoft".into();
        let backend =
            create_backend(&config, TokenStorage::new(dir.path()), false).unwrap();
        assert_eq!(backend.name(), "microsoft");
        assert_eq!(backend.id_marker(), "ms-todo-id");
        assert!(backend.capabilities().supports_priority);

        config.backend = "google".into();
        let backend =
            create_backend(&config, TokenStorage::new(dir.path()), false).unwrap();
        assert_eq!(backend.name(), "google");
        assert_eq!(backend.id_marker(), "google-tasks-id");
        assert!(!backend.capabilities().supports_priority);
    }
}

//! Google Tasks backend.
//!
//! OAuth 2.0 authorization-code flow with a localhost redirect; tokens cached
//! on disk and refreshed on expiry. Google Tasks has no priority concept, so
//! this backend never asserts a tier and `supports_priority` is false.

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};

use super::http::HttpClient;
use super::oauth::{self, OAuthConfig};
use super::{Capabilities, TaskBackend, TaskList};
use crate::config::GoogleConfig;
use crate::error::BackendError;
use crate::record::{CompletionState, TaskRecord};
use crate::retry::{with_backoff, BackoffPolicy};
use crate::token::TokenStorage;

const TASKS_API_ENDPOINT: &str = "https://tasks.googleapis.com/tasks/v1";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/tasks";
const REDIRECT_PORT: u16 = 19822;

/// Google caps page size at 100; larger lists paginate.
const PAGE_SIZE: u32 = 100;

const BACKEND_NAME: &str = "google";
const ID_MARKER: &str = "google-tasks-id";

pub struct GoogleTasksBackend {
    allow_prompt: bool,
    tokens: TokenStorage,
    http: HttpClient,
    base_url: String,
    backoff: BackoffPolicy,
    oauth_config: OAuthConfig,
    access_token: Option<String>,
}

impl GoogleTasksBackend {
    pub fn new(
        config: &GoogleConfig,
        tokens: TokenStorage,
        allow_prompt: bool,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            allow_prompt,
            tokens,
            http: HttpClient::new()?,
            base_url: TASKS_API_ENDPOINT.to_string(),
            backoff: BackoffPolicy::default(),
            oauth_config: OAuthConfig {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                auth_url: AUTH_URL.to_string(),
                token_url: TOKEN_URL.to_string(),
                scopes: vec![SCOPE.to_string()],
                redirect_port: REDIRECT_PORT,
            },
            access_token: None,
        })
    }

    /// Point the client at a test server.
    #[doc(hidden)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[doc(hidden)]
    pub fn with_backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    fn access_token(&self) -> Result<&str, BackendError> {
        self.access_token
            .as_deref()
            .ok_or_else(|| BackendError::Auth("not authenticated, call authenticate() first".into()))
    }

    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, BackendError> {
        let token = self.access_token()?;
        let url = format!("{}{path}", self.base_url);
        with_backoff(&self.backoff, || {
            self.http.request(method.clone(), &url, token, body)
        })
    }

    /// Collect `items` across `nextPageToken` pages.
    fn collect_pages(&self, path: &str, extra_query: &str) -> Result<Vec<Value>, BackendError> {
        let token = self.access_token()?;
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}{path}?maxResults={PAGE_SIZE}{extra_query}",
                self.base_url
            );
            if let Some(pt) = &page_token {
                url.push_str(&format!("&pageToken={pt}"));
            }

            let page = with_backoff(&self.backoff, || {
                self.http.request(Method::GET, &url, token, None)
            })?;

            if let Some(page_items) = page.get("items").and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }

            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(items)
    }
}

impl TaskBackend for GoogleTasksBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn id_marker(&self) -> &str {
        ID_MARKER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_priority: false,
        }
    }

    fn is_authenticated(&self) -> bool {
        self.tokens.has(BACKEND_NAME)
    }

    fn authenticate(&mut self) -> Result<(), BackendError> {
        if let Some(token) = self.tokens.valid_access_token(BACKEND_NAME) {
            tracing::debug!("using cached Google access token");
            self.access_token = Some(token);
            return Ok(());
        }

        if let Some(refresh) = self.tokens.refresh_token(BACKEND_NAME) {
            tracing::info!("refreshing Google access token");
            match oauth::refresh(&self.http, &self.oauth_config, &refresh) {
                Ok(tokens) => {
                    self.tokens
                        .save(BACKEND_NAME, &tokens)
                        .map_err(|e| BackendError::Auth(format!("failed to save tokens: {e}")))?;
                    self.access_token = Some(tokens.access_token);
                    return Ok(());
                }
                Err(err) => tracing::warn!("token refresh failed: {err}"),
            }
        }

        if !self.allow_prompt {
            return Err(BackendError::Auth(
                "Google authentication required but interactive prompt is disabled \
                 (--no-prompt). Run 'orgsync auth login --backend google' to authenticate."
                    .into(),
            ));
        }

        tracing::info!("starting interactive Google authentication");
        let tokens = oauth::authorize(&self.http, &self.oauth_config)?;
        self.tokens
            .save(BACKEND_NAME, &tokens)
            .map_err(|e| BackendError::Auth(format!("failed to save tokens: {e}")))?;
        self.access_token = Some(tokens.access_token);
        println!("\nAuthentication successful. Tokens saved for future runs.\n");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        self.access_token = None;
        self.tokens
            .clear(BACKEND_NAME)
            .map_err(|e| BackendError::Auth(format!("failed to clear tokens: {e}")))
    }

    fn task_lists(&self) -> Result<Vec<TaskList>, BackendError> {
        let items = self.collect_pages("/users/@me/lists", "")?;
        Ok(items
            .iter()
            .filter_map(|item| {
                Some(TaskList {
                    id: item.get("id")?.as_str()?.to_string(),
                    name: item
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                })
            })
            .collect())
    }

    fn list_tasks(&self, list_id: &str) -> Result<Vec<TaskRecord>, BackendError> {
        let items = self.collect_pages(
            &format!("/lists/{list_id}/tasks"),
            "&showCompleted=true&showHidden=true",
        )?;
        items.iter().map(api_to_record).collect()
    }

    fn create_task(&self, list_id: &str, record: &TaskRecord) -> Result<TaskRecord, BackendError> {
        let body = record_to_api(record, None);
        let resp = self.request(Method::POST, &format!("/lists/{list_id}/tasks"), Some(&body))?;
        api_to_record(&resp)
    }

    fn update_task(&self, list_id: &str, record: &TaskRecord) -> Result<TaskRecord, BackendError> {
        let id = record
            .identity(ID_MARKER)
            .ok_or_else(|| BackendError::MissingIdentity(record.title.clone()))?;
        let body = record_to_api(record, Some(id));
        let resp = self.request(
            Method::PUT,
            &format!("/lists/{list_id}/tasks/{id}"),
            Some(&body),
        )?;
        api_to_record(&resp)
    }
}

/// Build the Tasks API body. Priority never appears: the API has no field
/// for it.
fn record_to_api(record: &TaskRecord, id: Option<&str>) -> Value {
    let mut body = json!({
        "title": record.title,
        "status": match record.completion {
            CompletionState::Completed => "completed",
            CompletionState::Open => "needsAction",
        },
    });
    if let Some(id) = id {
        body["id"] = json!(id);
    }
    if let Some(detail) = record.detail.as_deref().filter(|d| !d.trim().is_empty()) {
        body["notes"] = json!(detail);
    }
    if let Some(due) = record.due_date {
        body["due"] = json!(format_due(due));
    }
    body
}

/// Convert a Tasks API task into a canonical record. Priority is always
/// absent.
fn api_to_record(api_task: &Value) -> Result<TaskRecord, BackendError> {
    let id = api_task
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::UnexpectedResponse("task missing id".into()))?;

    let status = api_task
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("needsAction");

    let detail = api_task
        .get("notes")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    Ok(TaskRecord {
        title: api_task
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        completion: if status == "completed" {
            CompletionState::Completed
        } else {
            CompletionState::Open
        },
        priority: None,
        due_date: api_task
            .get("due")
            .and_then(Value::as_str)
            .and_then(parse_due),
        detail,
        tags: Vec::new(),
        identities: [(ID_MARKER.to_string(), id.to_string())].into(),
    })
}

/// Google renders due dates as RFC 3339 at midnight UTC.
fn format_due(due: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", due.format("%Y-%m-%d"))
}

/// Tolerant parse of the `due` field: with or without a time component.
fn parse_due(value: &str) -> Option<NaiveDate> {
    let value = value.strip_suffix('Z').unwrap_or(value);
    let date_part = value.split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::OAuthTokens;

    fn test_backend(server_url: &str, tokens_dir: &std::path::Path) -> GoogleTasksBackend {
        let storage = TokenStorage::new(tokens_dir);
        storage
            .save(
                BACKEND_NAME,
                &OAuthTokens {
                    access_token: "test-token".into(),
                    refresh_token: None,
                    expires_at: Some(chrono::Utc::now().timestamp() + 3600),
                    token_type: "Bearer".into(),
                    scope: None,
                },
            )
            .unwrap();

        let config = GoogleConfig {
            client_id: "cid".into(),
            client_secret: "sec".into(),
        };
        let mut backend = GoogleTasksBackend::new(&config, storage, false)
            .unwrap()
            .with_base_url(server_url)
            .with_backoff_policy(BackoffPolicy::immediate(1));
        backend.authenticate().unwrap();
        backend
    }

    #[test]
    fn api_task_maps_to_record_without_priority() {
        let api_task = json!({
            "id": "g123",
            "title": "Buy milk",
            "status": "needsAction",
            "notes": "2 liters\n",
            "due": "2025-11-20T00:00:00.000Z",
        });
        let record = api_to_record(&api_task).unwrap();
        assert_eq!(record.title, "Buy milk");
        assert_eq!(record.completion, CompletionState::Open);
        assert_eq!(record.priority, None);
        assert_eq!(record.detail.as_deref(), Some("2 liters"));
        assert_eq!(
            record.due_date,
            Some(NaiveDate::from_ymd_opt(2025, 11, 20).unwrap())
        );
        assert_eq!(record.identity(ID_MARKER), Some("g123"));
    }

    #[test]
    fn record_body_never_carries_priority() {
        let mut record = TaskRecord::new("Call Bob");
        record.priority = Some(crate::record::PriorityTier::High);
        record.completion = CompletionState::Completed;

        let body = record_to_api(&record, None);
        assert_eq!(body["status"], "completed");
        assert!(body.get("importance").is_none());
        assert!(body.get("priority").is_none());
    }

    #[test]
    fn due_date_round_trips() {
        let due = NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
        assert_eq!(format_due(due), "2025-11-20T00:00:00.000Z");
        assert_eq!(parse_due("2025-11-20T00:00:00.000Z"), Some(due));
        assert_eq!(parse_due("2025-11-20"), Some(due));
        assert_eq!(parse_due("garbage"), None);
    }

    #[test]
    fn list_tasks_follows_page_tokens() {
        let mut server = mockito::Server::new();
        let dir = tempfile::tempdir().unwrap();

        let _page1 = server
            .mock(
                "GET",
                "/lists/L1/tasks?maxResults=100&showCompleted=true&showHidden=true",
            )
            .with_status(200)
            .with_body(
                json!({
                    "items": [{"id": "g1", "title": "One", "status": "needsAction"}],
                    "nextPageToken": "tok2",
                })
                .to_string(),
            )
            .create();
        let _page2 = server
            .mock(
                "GET",
                "/lists/L1/tasks?maxResults=100&showCompleted=true&showHidden=true&pageToken=tok2",
            )
            .with_status(200)
            .with_body(
                json!({
                    "items": [{"id": "g2", "title": "Two", "status": "completed"}],
                })
                .to_string(),
            )
            .create();

        let backend = test_backend(&server.url(), dir.path());
        let tasks = backend.list_tasks("L1").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].completion, CompletionState::Completed);
    }

    #[test]
    fn create_task_returns_assigned_identity() {
        let mut server = mockito::Server::new();
        let dir = tempfile::tempdir().unwrap();

        let _m = server
            .mock("POST", "/lists/L1/tasks")
            .with_status(200)
            .with_body(
                json!({"id": "fresh-g", "title": "Buy milk", "status": "needsAction"}).to_string(),
            )
            .create();

        let backend = test_backend(&server.url(), dir.path());
        let created = backend
            .create_task("L1", &TaskRecord::new("Buy milk"))
            .unwrap();
        assert_eq!(created.identity(ID_MARKER), Some("fresh-g"));
    }

    #[test]
    fn task_lists_map_title_to_name() {
        let mut server = mockito::Server::new();
        let dir = tempfile::tempdir().unwrap();

        let _m = server
            .mock("GET", "/users/@me/lists?maxResults=100")
            .with_status(200)
            .with_body(
                json!({"items": [{"id": "L1", "title": "Orgplan 2025"}]}).to_string(),
            )
            .create();

        let backend = test_backend(&server.url(), dir.path());
        let lists = backend.task_lists().unwrap();
        assert_eq!(
            lists,
            vec![TaskList {
                id: "L1".into(),
                name: "Orgplan 2025".into()
            }]
        );
    }
}

//! Microsoft To Do backend over the Graph API.
//!
//! Two authentication modes:
//! - `application`: client-credentials flow (needs a client secret and admin
//!   consent), token held in memory for the run
//! - `delegated`: device-code flow (user login, no admin consent), tokens
//!   cached on disk and refreshed when possible

use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Method;
use serde_json::{json, Value};

use super::http::HttpClient;
use super::oauth;
use super::{Capabilities, TaskBackend, TaskList};
use crate::config::MicrosoftConfig;
use crate::error::BackendError;
use crate::record::{CompletionState, PriorityTier, TaskRecord};
use crate::retry::{with_backoff, BackoffPolicy};
use crate::token::TokenStorage;

const GRAPH_API_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
const SCOPES_DELEGATED: &str = "offline_access https://graph.microsoft.com/Tasks.ReadWrite";
const SCOPES_APPLICATION: &str = "https://graph.microsoft.com/.default";

const BACKEND_NAME: &str = "microsoft";
const ID_MARKER: &str = "ms-todo-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    Application,
    Delegated,
}

pub struct MicrosoftTodoBackend {
    client_id: String,
    tenant_id: String,
    client_secret: Option<String>,
    auth_mode: AuthMode,
    allow_prompt: bool,
    tokens: TokenStorage,
    http: HttpClient,
    base_url: String,
    backoff: BackoffPolicy,
    access_token: Option<String>,
}

impl MicrosoftTodoBackend {
    pub fn new(
        config: &MicrosoftConfig,
        tokens: TokenStorage,
        allow_prompt: bool,
    ) -> Result<Self, BackendError> {
        let auth_mode = match config.auth_mode.as_str() {
            "application" => AuthMode::Application,
            _ => AuthMode::Delegated,
        };
        Ok(Self {
            client_id: config.client_id.clone(),
            tenant_id: config.tenant_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_mode,
            allow_prompt,
            tokens,
            http: HttpClient::new()?,
            base_url: GRAPH_API_ENDPOINT.to_string(),
            backoff: BackoffPolicy::default(),
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

    fn token_url(&self) -> String {
        format!("{LOGIN_ENDPOINT}/{}/oauth2/v2.0/token", self.tenant_id)
    }

    fn devicecode_url(&self) -> String {
        format!("{LOGIN_ENDPOINT}/{}/oauth2/v2.0/devicecode", self.tenant_id)
    }

    fn authenticate_application(&mut self) -> Result<(), BackendError> {
        let secret = self.client_secret.clone().ok_or_else(|| {
            BackendError::Auth("client secret is required for application mode".into())
        })?;
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", secret.as_str()),
            ("scope", SCOPES_APPLICATION),
            ("grant_type", "client_credentials"),
        ];
        let body = self.http.post_form(&self.token_url(), &params)?;
        let tokens = oauth::tokens_from_response(&body, None)?;
        self.access_token = Some(tokens.access_token);
        tracing::info!("authenticated with Microsoft Graph (application mode)");
        Ok(())
    }

    fn authenticate_delegated(&mut self) -> Result<(), BackendError> {
        if let Some(token) = self.tokens.valid_access_token(BACKEND_NAME) {
            tracing::debug!("using cached Microsoft access token");
            self.access_token = Some(token);
            return Ok(());
        }

        if let Some(refresh) = self.tokens.refresh_token(BACKEND_NAME) {
            tracing::info!("refreshing Microsoft access token");
            match self.refresh_tokens(&refresh) {
                Ok(()) => return Ok(()),
                Err(err) => tracing::warn!("token refresh failed: {err}"),
            }
        }

        if !self.allow_prompt {
            return Err(BackendError::Auth(
                "Microsoft authentication required but interactive prompt is disabled \
                 (--no-prompt). Run 'orgsync auth login' manually to authenticate."
                    .into(),
            ));
        }

        self.device_code_login()
    }

    fn refresh_tokens(&mut self, refresh: &str) -> Result<(), BackendError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh),
            ("grant_type", "refresh_token"),
            ("scope", SCOPES_DELEGATED),
        ];
        let body = self.http.post_form(&self.token_url(), &params)?;
        let tokens = oauth::tokens_from_response(&body, Some(refresh))?;
        self.tokens
            .save(BACKEND_NAME, &tokens)
            .map_err(|e| BackendError::Auth(format!("failed to save tokens: {e}")))?;
        self.access_token = Some(tokens.access_token);
        Ok(())
    }

    /// Device-code flow: show the user a code, poll until they sign in.
    fn device_code_login(&mut self) -> Result<(), BackendError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("scope", SCOPES_DELEGATED),
        ];
        let flow = self.http.post_form(&self.devicecode_url(), &params)?;

        let device_code = flow
            .get("device_code")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Auth("failed to create device flow".into()))?
            .to_string();
        let message = flow
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Sign in with the code shown in your browser.");
        let mut interval = flow.get("interval").and_then(Value::as_u64).unwrap_or(5);
        let expires_in = flow.get("expires_in").and_then(Value::as_u64).unwrap_or(900);

        println!("\n{}", "=".repeat(70));
        println!("AUTHENTICATION REQUIRED");
        println!("{}", "=".repeat(70));
        println!("{message}");
        println!("{}", "=".repeat(70));
        println!("\nWaiting for authentication...");

        if let Some(uri) = flow.get("verification_uri").and_then(Value::as_str) {
            if let Err(err) = open::that(uri) {
                tracing::warn!("could not open browser automatically: {err}");
            }
        }

        let mut waited = 0u64;
        loop {
            if waited >= expires_in {
                return Err(BackendError::Auth("device code expired".into()));
            }
            thread::sleep(Duration::from_secs(interval));
            waited += interval;

            let params = [
                ("client_id", self.client_id.as_str()),
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("device_code", device_code.as_str()),
            ];
            let body = self.http.post_form(&self.token_url(), &params)?;

            match body.get("error").and_then(Value::as_str) {
                Some("authorization_pending") => continue,
                Some("slow_down") => {
                    interval += 5;
                    continue;
                }
                _ => {}
            }

            let tokens = oauth::tokens_from_response(&body, None)?;
            self.tokens
                .save(BACKEND_NAME, &tokens)
                .map_err(|e| BackendError::Auth(format!("failed to save tokens: {e}")))?;
            self.access_token = Some(tokens.access_token);
            println!("\nAuthentication successful. Tokens saved for future runs.\n");
            tracing::info!("authenticated with Microsoft Graph (device code flow)");
            return Ok(());
        }
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

    /// Follow `@odata.nextLink` pages, collecting `value` arrays.
    fn collect_pages(&self, first_path: &str) -> Result<Vec<Value>, BackendError> {
        let token = self.access_token()?;
        let mut items = Vec::new();
        let mut url = format!("{}{first_path}", self.base_url);

        loop {
            let page = with_backoff(&self.backoff, || {
                self.http.request(Method::GET, &url, token, None)
            })?;
            let value = page
                .get("value")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    BackendError::UnexpectedResponse("missing 'value' in response".into())
                })?;
            items.extend(value.iter().cloned());

            match page.get("@odata.nextLink").and_then(Value::as_str) {
                Some(next) => url = next.to_string(),
                None => break,
            }
        }
        Ok(items)
    }
}

impl TaskBackend for MicrosoftTodoBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn id_marker(&self) -> &str {
        ID_MARKER
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_priority: true,
        }
    }

    fn is_authenticated(&self) -> bool {
        match self.auth_mode {
            AuthMode::Application => self.client_secret.is_some(),
            AuthMode::Delegated => self.tokens.has(BACKEND_NAME),
        }
    }

    fn authenticate(&mut self) -> Result<(), BackendError> {
        match self.auth_mode {
            AuthMode::Application => self.authenticate_application(),
            AuthMode::Delegated => self.authenticate_delegated(),
        }
    }

    fn disconnect(&mut self) -> Result<(), BackendError> {
        self.access_token = None;
        self.tokens
            .clear(BACKEND_NAME)
            .map_err(|e| BackendError::Auth(format!("failed to clear tokens: {e}")))
    }

    fn task_lists(&self) -> Result<Vec<TaskList>, BackendError> {
        let items = self.collect_pages("/me/todo/lists")?;
        Ok(items
            .iter()
            .filter_map(|item| {
                Some(TaskList {
                    id: item.get("id")?.as_str()?.to_string(),
                    name: item
                        .get("displayName")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                })
            })
            .collect())
    }

    fn list_tasks(&self, list_id: &str) -> Result<Vec<TaskRecord>, BackendError> {
        let items = self.collect_pages(&format!("/me/todo/lists/{list_id}/tasks"))?;
        items.iter().map(graph_to_record).collect()
    }

    fn create_task(&self, list_id: &str, record: &TaskRecord) -> Result<TaskRecord, BackendError> {
        let body = record_to_graph(record, true);
        let resp = self.request(
            Method::POST,
            &format!("/me/todo/lists/{list_id}/tasks"),
            Some(&body),
        )?;
        graph_to_record(&resp)
    }

    fn update_task(&self, list_id: &str, record: &TaskRecord) -> Result<TaskRecord, BackendError> {
        let id = record
            .identity(ID_MARKER)
            .ok_or_else(|| BackendError::MissingIdentity(record.title.clone()))?;
        let body = record_to_graph(record, false);
        let resp = self.request(
            Method::PATCH,
            &format!("/me/todo/lists/{list_id}/tasks/{id}"),
            Some(&body),
        )?;
        graph_to_record(&resp)
    }
}

/// Build the Graph task body. The notes body is only transmitted at creation
/// time; updates leave it untouched.
fn record_to_graph(record: &TaskRecord, include_body: bool) -> Value {
    let mut body = json!({
        "title": record.title,
        "status": match record.completion {
            CompletionState::Completed => "completed",
            CompletionState::Open => "notStarted",
        },
        "importance": match record.priority {
            Some(PriorityTier::High) => "high",
            Some(PriorityTier::Low) => "low",
            // "normal" is Graph's resting state; an absent tier renders the same.
            Some(PriorityTier::Normal) | None => "normal",
        },
    });

    if let Some(due) = record.due_date {
        body["dueDateTime"] = json!({
            "dateTime": format!("{}T00:00:00.0000000", due.format("%Y-%m-%d")),
            "timeZone": "UTC",
        });
    }

    if include_body {
        if let Some(detail) = record.detail.as_deref().filter(|d| !d.trim().is_empty()) {
            body["body"] = json!({"contentType": "text", "content": detail});
        }
    }

    body
}

/// Convert a Graph task into a canonical record.
///
/// Graph reports `importance: normal` on every untouched task, so only
/// `high` and `low` count as asserted tiers.
fn graph_to_record(api_task: &Value) -> Result<TaskRecord, BackendError> {
    let id = api_task
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::UnexpectedResponse("task missing id".into()))?;

    let status = api_task
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("notStarted");
    let completion = if status == "completed" {
        CompletionState::Completed
    } else {
        CompletionState::Open
    };

    let priority = match api_task.get("importance").and_then(Value::as_str) {
        Some("high") => Some(PriorityTier::High),
        Some("low") => Some(PriorityTier::Low),
        _ => None,
    };

    let detail = api_task
        .get("body")
        .and_then(|b| b.get("content"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from);

    let due_date = api_task
        .get("dueDateTime")
        .and_then(|d| d.get("dateTime"))
        .and_then(Value::as_str)
        .and_then(parse_graph_date);

    Ok(TaskRecord {
        title: api_task
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        completion,
        priority,
        due_date,
        detail,
        tags: Vec::new(),
        identities: [(ID_MARKER.to_string(), id.to_string())].into(),
    })
}

fn parse_graph_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d").ok()
}

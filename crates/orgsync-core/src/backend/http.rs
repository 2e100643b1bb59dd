//! Blocking JSON HTTP client shared by the backends.
//!
//! Callers stay synchronous (one run is strictly sequential); the client owns
//! a current-thread tokio runtime and blocks on each request. Status codes
//! are mapped onto [`BackendError`] so retry classification happens in one
//! place.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::Value;

use crate::error::BackendError;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClient {
    client: Client,
    runtime: tokio::runtime::Runtime,
}

impl HttpClient {
    pub fn new() -> Result<Self, BackendError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BackendError::Network(format!("failed to start runtime: {e}")))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self { client, runtime })
    }

    /// Run a future to completion on the owned runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Issue a bearer-authenticated JSON request. Empty response bodies come
    /// back as `Value::Null`.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, BackendError> {
        self.block_on(async {
            let mut req = self.client.request(method, url).bearer_auth(token);
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| BackendError::Network(e.to_string()))?;

            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();

            if status == 429 {
                return Err(BackendError::RateLimited(text));
            }
            if status == 401 || status == 403 {
                return Err(BackendError::Auth(format!("{status}: {text}")));
            }
            if status >= 400 {
                return Err(BackendError::Api {
                    status,
                    message: text,
                });
            }

            if text.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text)
                .map_err(|e| BackendError::UnexpectedResponse(format!("invalid JSON: {e}")))
        })
    }

    /// POST a `application/x-www-form-urlencoded` body, as OAuth token
    /// endpoints require. The response JSON is returned even for error
    /// statuses, since OAuth errors ride in the body.
    pub fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, BackendError> {
        self.block_on(async {
            let resp = self
                .client
                .post(url)
                .form(params)
                .send()
                .await
                .map_err(|e| BackendError::Network(e.to_string()))?;
            resp.json::<Value>()
                .await
                .map_err(|e| BackendError::UnexpectedResponse(format!("invalid JSON: {e}")))
        })
    }
}

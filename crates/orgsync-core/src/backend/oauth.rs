//! OAuth2 flows shared by the backends.
//!
//! The authorization-code flow (used by Google) works like a desktop app:
//!
//! 1. Opens the browser to the authorization URL
//! 2. Starts a tiny localhost HTTP server to receive the callback
//! 3. Exchanges the code for an access token (+ refresh token)
//!
//! Token persistence is the caller's business via [`TokenStorage`]; nothing
//! here touches global state. The device-code flow lives with the Microsoft
//! backend, which is its only user.

use std::io::{Read, Write};
use std::net::TcpListener;

use serde_json::Value;

use super::http::HttpClient;
use crate::error::BackendError;
use crate::token::OAuthTokens;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: u16,
}

impl OAuthConfig {
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    pub fn auth_url_full(&self) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.auth_url,
            encode(&self.client_id),
            encode(&self.redirect_uri()),
            encode(&scopes),
        )
    }
}

/// Run the authorization-code flow: open browser, wait for the callback,
/// exchange the code.
pub fn authorize(http: &HttpClient, config: &OAuthConfig) -> Result<OAuthTokens, BackendError> {
    let auth_url = config.auth_url_full();
    if let Err(err) = open::that(&auth_url) {
        tracing::warn!("could not open browser automatically: {err}");
        println!("Open this URL to sign in:\n  {auth_url}");
    }

    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.redirect_port))
        .map_err(|e| BackendError::Auth(format!("failed to bind callback port: {e}")))?;

    let (mut stream, _) = listener
        .accept()
        .map_err(|e| BackendError::Auth(format!("callback accept failed: {e}")))?;
    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .map_err(|e| BackendError::Auth(format!("callback read failed: {e}")))?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let code = extract_code(&request)
        .ok_or_else(|| BackendError::Auth("no code in OAuth callback".into()))?;

    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html><body><h2>Authentication successful!</h2><p>You can close this tab.</p></body></html>";
    let _ = stream.write_all(response.as_bytes());
    drop(stream);
    drop(listener);

    exchange_code(http, config, &code)
}

/// Exchange an authorization code for tokens.
fn exchange_code(
    http: &HttpClient,
    config: &OAuthConfig,
    code: &str,
) -> Result<OAuthTokens, BackendError> {
    let redirect_uri = config.redirect_uri();
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", redirect_uri.as_str()),
    ];
    let body = http.post_form(&config.token_url, &params)?;
    tokens_from_response(&body, None)
}

/// Refresh an access token. The old refresh token is carried over when the
/// endpoint does not return a new one.
pub fn refresh(
    http: &HttpClient,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<OAuthTokens, BackendError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    let body = http.post_form(&config.token_url, &params)?;
    tokens_from_response(&body, Some(refresh_token))
}

/// Parse a token-endpoint response into [`OAuthTokens`].
pub fn tokens_from_response(
    body: &Value,
    fallback_refresh: Option<&str>,
) -> Result<OAuthTokens, BackendError> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        let description = body
            .get("error_description")
            .and_then(Value::as_str)
            .unwrap_or(error);
        return Err(BackendError::Auth(description.to_string()));
    }

    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Auth("token response missing access_token".into()))?
        .to_string();

    let expires_in = body.get("expires_in").and_then(Value::as_i64);
    let expires_at = expires_in.map(|ei| chrono::Utc::now().timestamp() + ei);

    Ok(OAuthTokens {
        access_token,
        refresh_token: body
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| fallback_refresh.map(String::from)),
        expires_at,
        token_type: body
            .get("token_type")
            .and_then(Value::as_str)
            .unwrap_or("Bearer")
            .to_string(),
        scope: body.get("scope").and_then(Value::as_str).map(String::from),
    })
}

fn extract_code(request: &str) -> Option<String> {
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;
    let url = url::Url::parse(&format!("http://localhost{path}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
}

fn encode(s: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_key_only(s)
        .finish()
}

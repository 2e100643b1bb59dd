//! File-based OAuth token cache.
//!
//! One JSON file per backend under a storage directory the caller chooses.
//! The cache is constructed explicitly and passed to backend constructors;
//! nothing in the crate touches it as ambient state.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tokens as returned by an OAuth2 token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp; `None` when the endpoint gave no expiry.
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthTokens {
    /// Whether the access token is expired (with a 60s buffer).
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => chrono::Utc::now().timestamp() > exp - 60,
            None => false,
        }
    }
}

/// Per-backend token files in one directory.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    dir: PathBuf,
}

impl TokenStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default location: `~/.config/orgsync/tokens`.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orgsync")
            .join("tokens")
    }

    fn token_file(&self, backend: &str) -> PathBuf {
        self.dir.join(format!("{backend}_tokens.json"))
    }

    /// Load tokens for a backend. Missing or unreadable files yield `None`.
    pub fn load(&self, backend: &str) -> Option<OAuthTokens> {
        let path = self.token_file(backend);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(tokens) => Some(tokens),
            Err(err) => {
                tracing::warn!("ignoring malformed token file {}: {err}", path.display());
                None
            }
        }
    }

    /// Persist tokens for a backend with owner-only permissions.
    pub fn save(&self, backend: &str, tokens: &OAuthTokens) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }

        let path = self.token_file(backend);
        fs::write(&path, serde_json::to_string_pretty(tokens)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!("saved tokens to {}", path.display());
        Ok(())
    }

    /// Access token if present and not expired.
    pub fn valid_access_token(&self, backend: &str) -> Option<String> {
        let tokens = self.load(backend)?;
        if tokens.is_expired() {
            tracing::debug!("cached access token for {backend} is expired");
            return None;
        }
        Some(tokens.access_token)
    }

    pub fn refresh_token(&self, backend: &str) -> Option<String> {
        self.load(backend)?.refresh_token
    }

    pub fn has(&self, backend: &str) -> bool {
        self.token_file(backend).exists()
    }

    /// Remove stored tokens for a backend. Absent files are fine.
    pub fn clear(&self, backend: &str) -> io::Result<()> {
        match fs::remove_file(self.token_file(backend)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

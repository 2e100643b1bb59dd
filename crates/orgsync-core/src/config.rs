//! Application configuration.
//!
//! Settings come from three layers, later layers winning: a TOML file at
//! `~/.config/orgsync/config.toml`, environment variables, and CLI flags
//! (applied by the caller). Validation collects every problem in one pass so
//! a misconfigured cron run fails with the full picture.

use std::env;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Microsoft Graph credentials and auth mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MicrosoftConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub tenant_id: String,
    /// Required for `application` mode only.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// `delegated` (device code, per-user) or `application` (client
    /// credentials, needs admin consent).
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,
}

/// Google OAuth client credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend to sync against: `microsoft` or `google`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Display name of the remote task list.
    #[serde(default)]
    pub todo_list: Option<String>,
    /// Root directory holding `<YYYY>/<MM>-notes.md` scope files.
    #[serde(default = "default_orgplan_dir")]
    pub orgplan_dir: PathBuf,
    /// Month to sync, `YYYY-MM`. Defaults to the current month.
    #[serde(default)]
    pub month: Option<String>,
    /// Token cache directory. Defaults to `~/.config/orgsync/tokens`.
    #[serde(default)]
    pub token_dir: Option<PathBuf>,
    #[serde(default)]
    pub microsoft: MicrosoftConfig,
    #[serde(default)]
    pub google: GoogleConfig,
}

fn default_backend() -> String {
    "microsoft".to_string()
}

fn default_orgplan_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_auth_mode() -> String {
    "delegated".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            todo_list: None,
            orgplan_dir: default_orgplan_dir(),
            month: None,
            token_dir: None,
            microsoft: MicrosoftConfig {
                auth_mode: default_auth_mode(),
                ..Default::default()
            },
            google: GoogleConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location: `~/.config/orgsync/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("orgsync")
            .join("config.toml")
    }

    /// Load the config file (if present) and overlay environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load from a specific file path and overlay environment variables.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).map_err(|err| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })?;
            toml::from_str(&contents).map_err(|err| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Overlay environment variables onto the loaded values.
    fn apply_env(&mut self) {
        if let Ok(v) = env::var("SYNC_BACKEND") {
            self.backend = v;
        }
        if let Ok(v) = env::var("TODO_LIST_NAME") {
            self.todo_list = Some(v);
        }
        if let Ok(v) = env::var("ORGPLAN_DIR") {
            self.orgplan_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("SYNC_MONTH") {
            self.month = Some(v);
        }
        if let Ok(v) = env::var("MS_CLIENT_ID") {
            self.microsoft.client_id = v;
        }
        if let Ok(v) = env::var("MS_TENANT_ID") {
            self.microsoft.tenant_id = v;
        }
        if let Ok(v) = env::var("MS_CLIENT_SECRET") {
            self.microsoft.client_secret = Some(v);
        }
        if let Ok(v) = env::var("MS_AUTH_MODE") {
            self.microsoft.auth_mode = v;
        }
        if let Ok(v) = env::var("GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Ok(v) = env::var("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = v;
        }
    }

    /// The month in scope, `YYYY-MM`.
    pub fn month(&self) -> String {
        self.month.clone().unwrap_or_else(|| {
            let now = Local::now();
            format!("{:04}-{:02}", now.year(), now.month())
        })
    }

    /// Scope file for the month in scope: `<orgplan_dir>/<YYYY>/<MM>-notes.md`.
    pub fn scope_file(&self) -> PathBuf {
        let month = self.month();
        let (year, month_num) = month.split_once('-').unwrap_or((month.as_str(), "01"));
        self.orgplan_dir.join(year).join(format!("{month_num}-notes.md"))
    }

    /// Token cache directory.
    pub fn token_dir(&self) -> PathBuf {
        self.token_dir
            .clone()
            .unwrap_or_else(crate::token::TokenStorage::default_dir)
    }

    /// Validate for a run against the configured backend. Returns every
    /// problem found, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match self.backend.as_str() {
            "microsoft" => {
                if self.microsoft.client_id.is_empty() {
                    errors.push("Microsoft Client ID is required".to_string());
                }
                if self.microsoft.tenant_id.is_empty() {
                    errors.push("Microsoft Tenant ID is required".to_string());
                }
                if self.microsoft.auth_mode == "application"
                    && self.microsoft.client_secret.as_deref().unwrap_or("").is_empty()
                {
                    errors.push(
                        "Microsoft Client Secret is required for application auth mode"
                            .to_string(),
                    );
                }
                if !matches!(self.microsoft.auth_mode.as_str(), "application" | "delegated") {
                    errors.push(format!(
                        "Invalid auth mode: {} (expected 'application' or 'delegated')",
                        self.microsoft.auth_mode
                    ));
                }
            }
            "google" => {
                if self.google.client_id.is_empty() {
                    errors.push("Google Client ID is required".to_string());
                }
                if self.google.client_secret.is_empty() {
                    errors.push("Google Client Secret is required".to_string());
                }
            }
            other => {
                return Err(ConfigError::UnknownBackend(other.to_string()));
            }
        }

        if self.todo_list.as_deref().unwrap_or("").is_empty() {
            errors.push("Task list name is required".to_string());
        }

        if !self.orgplan_dir.exists() {
            errors.push(format!(
                "Orgplan directory does not exist: {}",
                self.orgplan_dir.display()
            ));
        } else if !self.orgplan_dir.is_dir() {
            errors.push(format!(
                "Orgplan directory is not a directory: {}",
                self.orgplan_dir.display()
            ));
        }

        let month = self.month();
        if NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").is_err() {
            errors.push(format!("Invalid month format: {month} (expected YYYY-MM)"));
        } else if !self.scope_file().exists() {
            errors.push(format!(
                "Orgplan file for {month} does not exist: {}",
                self.scope_file().display()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

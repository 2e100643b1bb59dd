//! Authentication management for backends.

use std::path::PathBuf;

use clap::Subcommand;
use orgsync_core::backend::create_backend;
use orgsync_core::TokenStorage;

/// Auth actions.
#[derive(Subcommand)]
pub enum AuthAction {
    /// Sign in to a backend and cache tokens for future runs
    Login {
        /// Backend to authenticate with (microsoft, google)
        #[arg(long)]
        backend: Option<String>,
        /// Path to an alternative config file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Show authentication status
    Status {
        /// Backend to check (microsoft, google)
        #[arg(long)]
        backend: Option<String>,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Remove cached tokens
    Logout {
        /// Backend to sign out of (microsoft, google)
        #[arg(long)]
        backend: Option<String>,
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

pub fn run(action: AuthAction) -> Result<i32, Box<dyn std::error::Error>> {
    match action {
        AuthAction::Login { backend, config } => {
            let config = configured(backend, config)?;
            let tokens = TokenStorage::new(config.token_dir());
            let mut backend = create_backend(&config, tokens, true)?;
            backend.authenticate()?;
            println!("Authenticated with {}.", backend.name());
            Ok(0)
        }
        AuthAction::Status { backend, config } => {
            let config = configured(backend, config)?;
            let tokens = TokenStorage::new(config.token_dir());
            let backend = create_backend(&config, tokens, false)?;
            if backend.is_authenticated() {
                println!("{}: authenticated", backend.name());
            } else {
                println!("{}: not authenticated", backend.name());
            }
            Ok(0)
        }
        AuthAction::Logout { backend, config } => {
            let config = configured(backend, config)?;
            let tokens = TokenStorage::new(config.token_dir());
            let mut backend = create_backend(&config, tokens, false)?;
            backend.disconnect()?;
            println!("Cleared credentials for {}.", backend.name());
            Ok(0)
        }
    }
}

fn configured(
    backend: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<orgsync_core::Config, Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path.as_ref())?;
    if let Some(backend) = backend {
        config.backend = backend;
    }
    Ok(config)
}

//! Enumerate the remote task lists on the configured backend.

use std::path::PathBuf;

use clap::Args;
use orgsync_core::backend::create_backend;
use orgsync_core::TokenStorage;

/// Arguments for `orgsync lists`.
#[derive(Args)]
pub struct ListsArgs {
    /// Backend to query (microsoft, google)
    #[arg(long)]
    pub backend: Option<String>,

    /// Fail instead of prompting for interactive authentication
    #[arg(long)]
    pub no_prompt: bool,

    /// Path to an alternative config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub fn run(args: ListsArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = super::load_config(args.config.as_ref())?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let tokens = TokenStorage::new(config.token_dir());
    let mut backend = create_backend(&config, tokens, !args.no_prompt)?;
    backend.authenticate()?;

    let lists = backend.task_lists()?;
    if lists.is_empty() {
        println!("No task lists found.");
    } else {
        println!("Task lists on {}:", backend.name());
        for list in lists {
            println!("  - {} (ID: {})", list.name, list.id);
        }
    }
    Ok(0)
}

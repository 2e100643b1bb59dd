//! The sync subcommand: one full reconciliation cycle.

use std::path::PathBuf;

use clap::Args;
use orgsync_core::backend::create_backend;
use orgsync_core::{OrgplanStore, SyncEngine, SyncLock, TokenStorage};

/// Arguments for `orgsync sync`.
#[derive(Args)]
pub struct SyncArgs {
    /// Backend to sync against (microsoft, google)
    #[arg(long)]
    pub backend: Option<String>,

    /// Name of the remote task list to sync with
    #[arg(long)]
    pub list: Option<String>,

    /// Month to sync in YYYY-MM format (default: current month)
    #[arg(long)]
    pub month: Option<String>,

    /// Root directory for orgplan files
    #[arg(long, value_name = "DIR")]
    pub orgplan_dir: Option<PathBuf>,

    /// Preview changes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON instead of the summary table
    #[arg(long)]
    pub json: bool,

    /// Fail instead of prompting for interactive authentication (for cron)
    #[arg(long)]
    pub no_prompt: bool,

    /// Path to an alternative config file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

pub fn run(args: SyncArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = super::load_config(args.config.as_ref())?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(list) = args.list {
        config.todo_list = Some(list);
    }
    if let Some(month) = args.month {
        config.month = Some(month);
    }
    if let Some(dir) = args.orgplan_dir {
        config.orgplan_dir = dir;
    }
    config.validate()?;

    let scope_file = config.scope_file();
    tracing::info!("syncing month {} against {}", config.month(), config.backend);
    tracing::info!("orgplan file: {}", scope_file.display());
    if args.dry_run {
        tracing::info!("DRY RUN MODE: no changes will be applied");
    }

    // One sync process per task-list file; released on every exit path.
    let lock = SyncLock::for_scope_file(&scope_file);
    let _guard = lock.acquire()?;

    let tokens = TokenStorage::new(config.token_dir());
    let mut backend = create_backend(&config, tokens, !args.no_prompt)?;
    backend.authenticate()?;

    let list_name = config.todo_list.clone().unwrap_or_default();
    let list = match backend.find_list(&list_name)? {
        Some(list) => list,
        None => {
            eprintln!("Task list '{list_name}' not found. Available lists:");
            for list in backend.task_lists()? {
                eprintln!("  - {}", list.name);
            }
            return Err(orgsync_core::BackendError::ListNotFound(list_name).into());
        }
    };
    tracing::info!("found list: {} (ID: {})", list.name, list.id);

    let (mut store, warnings) = OrgplanStore::open(&scope_file)?;
    for warning in &warnings {
        tracing::warn!("orgplan format: {warning}");
    }

    let mut engine = SyncEngine::new(&mut store, backend.as_ref(), &list.id, args.dry_run);
    let report = engine.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(report.exit_code())
}

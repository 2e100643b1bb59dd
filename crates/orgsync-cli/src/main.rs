use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// Exit code for configuration or connectivity failures.
const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "orgsync", version, about = "Sync orgplan task lists with a cloud task service")]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also log to this file (console always logs)
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation cycle
    Sync(commands::sync::SyncArgs),
    /// Authentication management for backends
    Auth {
        #[command(subcommand)]
        action: commands::auth::AuthAction,
    },
    /// Show the remote task lists on the configured backend
    Lists(commands::lists::ListsArgs),
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
}

fn init_logging(verbose: bool, log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(|f| f.to_os_string()).unwrap_or_else(|| "orgsync.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_ref());

    let result = match cli.command {
        Commands::Sync(args) => commands::sync::run(args),
        Commands::Auth { action } => commands::auth::run(action),
        Commands::Lists(args) => commands::lists::run(args),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "orgsync", &mut io::stdout());
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

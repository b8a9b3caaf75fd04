//! registry-sync CLI
//!
//! Usage:
//!   registry-sync run [--force] [--db path] [--config path]
//!   registry-sync config [--config path]

use clap::{Parser, Subcommand};
use registry_sync::{run_import, HttpFetcher, OpenStore, SqliteStore, SyncConfig};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "registry-sync",
    version,
    about = "Synchronize a local events registry with a remote LinkedEvents API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// TOML configuration file (default: ./registry-sync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import everything from the remote API and sweep what disappeared
    Run {
        /// Delete even when a sweep exceeds the safety threshold
        #[arg(long)]
        force: bool,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("registry_sync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<SyncConfig, String> {
    SyncConfig::load_from(path.map(PathBuf::as_path)).map_err(|e| e.to_string())
}

fn cmd_config(config_path: Option<PathBuf>) -> i32 {
    let config = match load_config(config_path.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_run(config_path: Option<PathBuf>, db: Option<PathBuf>, force: bool) -> i32 {
    let mut config = match load_config(config_path.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return 1;
        }
    };
    if db.is_some() {
        config.database = db;
    }

    let db_path = config.database_path();
    let store = match SqliteStore::open(&db_path) {
        Ok(s) => s,
        Err(e) => {
            error!(path = %db_path.display(), error = %e, "failed to open database");
            return 1;
        }
    };
    let fetcher = match HttpFetcher::new(config.fetch_settings(), config.timeout()) {
        Ok(f) => f,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return 1;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to create tokio runtime");
            return 1;
        }
    };

    info!(data_source = %config.data_source, api = %config.api_url, force, "starting import");
    match rt.block_on(run_import(&store, &fetcher, &config, force)) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => error!(error = %e, "failed to serialize report"),
            }
            if report.skipped_sweeps.is_empty() {
                0
            } else {
                2
            }
        }
        Err(e) => {
            error!(error = %e, "import failed");
            1
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Run { force, db } => cmd_run(cli.config, db, force),
        Commands::Config => cmd_config(cli.config),
    };
    std::process::exit(code);
}

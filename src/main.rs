//! # docsync CLI
//!
//! The `docsync` binary keeps a vector index in sync with a folder of
//! documents.
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./config/docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync init` | Create the index database and the watched folder |
//! | `docsync scan <type> <path>` | Run one reconciliation (`full`, `modify`, `remove`, `reset`) |
//! | `docsync watch` | Watch the folder and apply changes until Ctrl-C |
//! | `docsync status` | Summarize the index and the tracked files |
//!
//! ## Examples
//!
//! ```bash
//! # Index everything in a folder
//! docsync scan full ./watched_folder
//!
//! # Re-index one file after editing it
//! docsync scan modify ./watched_folder/report.pdf
//!
//! # Rebuild from scratch with an offline embedder
//! docsync scan reset . && docsync scan full ./watched_folder --profile offline
//!
//! # Keep the index live
//! RUST_LOG=docsync=debug docsync watch
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsync::{config, reconcile, sqlite_store, status, watch_cmd};

/// docsync: keep a vector index in sync with a folder of documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Keep a vector index in sync with a watched folder of documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the index database and the watched folder.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Run one reconciliation against the index.
    ///
    /// `full` and `reset` take a folder, `modify` and `remove` a file.
    /// `reset` drops every entry without asking.
    Scan {
        /// One of `full`, `modify`, `remove`, `reset`.
        scan_type: String,

        /// Folder or file to reconcile.
        path: PathBuf,

        /// Embedding profile (defaults to `[embedding].profile`).
        #[arg(long)]
        profile: Option<String>,

        /// Override the index database path from config.
        #[arg(long)]
        index: Option<PathBuf>,
    },

    /// Watch the configured folder and apply every change to the index.
    Watch {
        /// Embedding profile (defaults to `[embedding].profile`).
        #[arg(long)]
        profile: Option<String>,

        /// Skip the `full` scan normally run before watching starts.
        #[arg(long)]
        no_initial_scan: bool,
    },

    /// Summarize the index and the change detector's tracked files.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = sqlite_store::SqliteIndexStore::open(&cfg.index.path).await?;
            store.pool().close().await;
            std::fs::create_dir_all(&cfg.watch.root)?;
            println!("Index initialized at {}.", cfg.index.path.display());
            println!("Watched folder: {}", cfg.watch.root.display());
        }
        Commands::Scan {
            scan_type,
            path,
            profile,
            index,
        } => {
            let index_path = index.unwrap_or_else(|| cfg.index.path.clone());
            let report =
                reconcile::run(&cfg, &index_path, &path, profile.as_deref(), &scan_type).await?;
            if scan_type == "reset" {
                println!("Index reset.");
            } else {
                println!("Scan '{}' complete: {}", scan_type, report);
            }
            if report.stale_entries > 0 {
                println!(
                    "Warning: {} entries were built with other chunking parameters. \
                     Run `docsync scan reset` then `docsync scan full` to rebuild.",
                    report.stale_entries
                );
            }
        }
        Commands::Watch {
            profile,
            no_initial_scan,
        } => {
            watch_cmd::run_watch(&cfg, profile.as_deref(), !no_initial_scan).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
    }

    Ok(())
}

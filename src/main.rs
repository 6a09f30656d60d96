//! # Project Ingest CLI (`pjx`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pjx init` | Create the SQLite database and schema |
//! | `pjx process <dir>` | Extract and reconcile every document in a directory |
//! | `pjx show <project_id>` | Print a stored project and its relations |
//! | `pjx stats` | Row counts for projects and lookup dictionaries |
//!
//! ## Examples
//!
//! ```bash
//! pjx init
//! pjx process ./inbox
//! pjx process ./inbox --update --workers 2
//! pjx show P-100 --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use project_ingest::{config, logging, migrate, pipeline, show, stats};

/// Extract structured project records from documents with a local LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(name = "pjx", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pjx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it on an existing database is safe.
    Init,

    /// Scan a directory for documents and reconcile extracted projects.
    ///
    /// Only `.docx` and `.pdf` files directly inside the directory are read;
    /// everything else is ignored. A failing document is reported and
    /// skipped, never fatal.
    Process {
        /// Directory containing the documents.
        directory: PathBuf,

        /// Update existing projects when a matching project_id is found.
        #[arg(long)]
        update: bool,

        /// Documents processed concurrently (overrides `batch.workers`).
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Show a stored project by its project_id.
    Show {
        project_id: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print row counts for projects and lookup dictionaries.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;
    logging::init_tracing(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Process {
            directory,
            update,
            workers,
        } => {
            if workers == Some(0) {
                anyhow::bail!("--workers must be >= 1");
            }
            pipeline::run_process(&cfg, &directory, update, workers).await?;
        }
        Commands::Show { project_id, json } => {
            show::run_show(&cfg, &project_id, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

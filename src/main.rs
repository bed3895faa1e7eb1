//! # ipfs-search CLI
//!
//! ## Usage
//!
//! ```bash
//! ipfs-search [--config ~/.ipfs/search.toml] [-v] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `index <address\|path>` | Index one object, file, or directory |
//! | `search "<query>"` | Hybrid metadata + semantic search (top 5) |
//! | `build` | Index every pinned object not yet fully indexed |
//! | `list` | Show every record and its state |
//! | `remove <address>` | Delete the record for an address |
//! | `metadata <address>` / `metadata --all` | Print stored metadata |
//!
//! Logs go to stderr (`-v` for info, `-vv` for debug, `RUST_LOG` overrides);
//! results go to stdout.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ipfs_search::config::resolve_config;
use ipfs_search::progress::ProgressMode;
use ipfs_search::{get, ingest, search, stats};

/// Semantic and metadata search over IPFS content.
#[derive(Parser)]
#[command(name = "ipfs-search", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `~/.ipfs/search.toml`
    /// when it exists, otherwise built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a content address, a local file, or every file in a directory.
    ///
    /// Local files are added to the content store first and extracted in
    /// place, so `<file>.metadata.txt` sidecars apply.
    Index {
        /// Content address or filesystem path.
        target: String,

        /// Re-index even if a full record exists. A full record is never
        /// replaced by a basic one.
        #[arg(long)]
        force: bool,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the index.
    Search {
        query: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Index every pinned object that lacks a full record.
    Build {
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: auto (human on a terminal), human, json, off.
        #[arg(long, default_value = "auto", value_parser = ["auto", "human", "json", "off"])]
        progress: String,
    },

    /// List indexed records with their state.
    List {
        #[arg(long)]
        json: bool,
    },

    /// Delete the index record for an address.
    Remove { address: String },

    /// Print stored metadata for one address, or for every record.
    Metadata {
        #[arg(required_unless_present = "all")]
        address: Option<String>,

        #[arg(long, conflicts_with = "address")]
        all: bool,

        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Index {
            target,
            force,
            json,
        } => {
            ingest::run_index(&cfg, &target, force, json).await?;
        }
        Commands::Search { query, json } => {
            search::run_search(&cfg, &query, json).await?;
        }
        Commands::Build { json, progress } => {
            let mode = match progress.as_str() {
                "human" => ProgressMode::Human,
                "json" => ProgressMode::Json,
                "off" => ProgressMode::Off,
                _ => ProgressMode::default_for_tty(),
            };
            ingest::run_build(&cfg, json, mode).await?;
        }
        Commands::List { json } => {
            stats::run_list(&cfg, json)?;
        }
        Commands::Remove { address } => {
            ingest::run_remove(&cfg, &address)?;
        }
        Commands::Metadata { address, all, json } => {
            get::run_metadata(&cfg, address.as_deref(), all, json)?;
        }
    }

    Ok(())
}

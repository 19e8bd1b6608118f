//! # NyaySetu CLI (`nyay`)
//!
//! Serves the legal Q&A API, builds the base knowledge index and answers
//! single questions from the terminal.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nyay serve` | Start the HTTP API |
//! | `nyay index build` | Build the base index from the legal corpus |
//! | `nyay index stats` | Show what a persisted index contains |
//! | `nyay ask "<question>"` | Answer one question (optionally with `--file`) |
//!
//! ## Examples
//!
//! ```bash
//! nyay index build --source ./data/legal_docs
//! nyay ask "What is anticipatory bail?"
//! nyay ask "Can my landlord evict me?" --file lease.pdf --json
//! nyay serve --config ./config/nyay.toml
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `nyaysetu=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use nyaysetu::{ask_cmd, config, index_cmd, server};

const DEFAULT_CONFIG: &str = "./config/nyay.toml";

/// NyaySetu: retrieval-augmented answers to Indian legal questions.
#[derive(Parser)]
#[command(name = "nyay", version, about)]
struct Cli {
    /// Path to the configuration file (TOML).
    ///
    /// Without this flag `./config/nyay.toml` is used when present and the
    /// built-in defaults otherwise. An explicit path must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Build or inspect persisted indexes.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Answer one question and exit.
    Ask {
        question: String,

        /// A `.txt` or `.pdf` document to ground the answer in.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Reuse (or start) the uploaded index of this session.
        #[arg(long)]
        session: Option<String>,

        /// Print the full answer object as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Chunk and embed the corpus into the base index.
    Build {
        /// Corpus directory (defaults to `[index].source_dir`).
        #[arg(long)]
        source: Option<PathBuf>,

        /// Replace an existing base index.
        #[arg(long)]
        force: bool,
    },

    /// Print chunk counts, model and dimensions.
    Stats {
        /// Inspect this session's uploaded index instead of the base index.
        #[arg(long)]
        uploaded: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nyaysetu=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_or_default(&PathBuf::from(DEFAULT_CONFIG))?,
    };

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build { source, force } => {
                index_cmd::run_index_build(&cfg, source, force).await?;
            }
            IndexAction::Stats { uploaded } => {
                index_cmd::run_index_stats(&cfg, uploaded).await?;
            }
        },
        Commands::Ask {
            question,
            file,
            session,
            json,
        } => {
            ask_cmd::run_ask(&cfg, &question, file, session, json).await?;
        }
    }

    Ok(())
}

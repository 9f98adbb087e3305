//! # Notes RAG CLI (`rag`)
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Chunk, embed, and store the dataset |
//! | `rag ask "<question>"` | Answer a question from the notes |
//! | `rag search "<query>"` | Show reranked chunks without generating |
//! | `rag chat` | Interactive question loop |
//! | `rag chunk <file>` | Print the header chunks of a file |
//! | `rag stats` | Collection summary |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use notes_rag::chunk::run_chunk;
use notes_rag::progress::ProgressMode;
use notes_rag::{ask, config, ingest, logging, stats};
use notes_rag_core::chunk::BoundaryDepths;

/// Notes RAG: retrieve-and-rerank question answering over markdown notes.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Retrieve-and-rerank question answering over personal markdown notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    /// Log debug diagnostics to stderr (overridden by RAG_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed, and store the dataset.
    ///
    /// Skips when the collection already holds records, unless `--rebuild`
    /// is given. A rebuild replaces the collection entirely.
    Ingest {
        /// Replace an existing, non-empty collection.
        #[arg(long)]
        rebuild: bool,

        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Answer a question using the notes as context.
    Ask {
        question: String,

        /// Number of chunks handed to the generator (default: retrieval.top_n).
        #[arg(long)]
        top_n: Option<usize>,

        /// Print the answer once complete instead of streaming it.
        #[arg(long)]
        no_stream: bool,

        /// Print question, answer, and sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve and rerank without generating an answer.
    Search {
        query: String,

        #[arg(long)]
        top_n: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Interactive question loop (`quit`, `exit`, or `q` to leave).
    Chat,

    /// Print the header-aware chunks of a markdown file. Needs no config.
    Chunk {
        path: PathBuf,

        /// Header depths that open a chunk, e.g. `1,2`.
        #[arg(long, default_value = "1,2,3")]
        depths: BoundaryDepths,

        #[arg(long)]
        json: bool,
    },

    /// Show collection statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Commands that don't require config
    if let Commands::Chunk { path, depths, json } = &cli.command {
        return run_chunk(path, depths, *json);
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            rebuild,
            dry_run,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let reporter = mode.reporter();
            ingest::run_ingest(&cfg, rebuild, dry_run, reporter.as_ref()).await?;
        }
        Commands::Ask {
            question,
            top_n,
            no_stream,
            json,
        } => {
            ask::run_ask(&cfg, &question, top_n, !no_stream, json).await?;
        }
        Commands::Search { query, top_n, json } => {
            ask::run_search(&cfg, &query, top_n, json).await?;
        }
        Commands::Chat => {
            ask::run_chat(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Chunk { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}

//! # Quarry CLI (`quarry`)
//!
//! The `quarry` binary is the interface to the retrieval engine. It
//! provides commands for database initialization, ingestion, search,
//! graph traversal, and store maintenance.
//!
//! ## Usage
//!
//! ```bash
//! quarry --config ./config/quarry.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quarry init` | Create the SQLite database and schema |
//! | `quarry ingest <path>` | Ingest a file or directory |
//! | `quarry search "<query>"` | Query indexed documents |
//! | `quarry get <id>` | Print a document with its chunks and links |
//! | `quarry related <id>` | Walk the link graph from an entity |
//! | `quarry remove <id>` | Remove a document and its derived data |
//! | `quarry stats` | Summarize what is indexed |

mod chunk;
mod config;
mod db;
mod embedding;
mod get;
mod ingest;
mod links;
mod migrate;
mod models;
mod related;
mod remove;
mod score;
mod search;
mod stats;
mod tokens;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::ingest::IngestOptions;
use crate::models::DocKind;
use crate::search::QueryFilters;

/// Quarry CLI — a local, single-user knowledge retrieval engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/quarry.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "quarry",
    about = "Quarry — a local knowledge retrieval engine with chunking, hybrid scoring, and a link graph",
    version,
    long_about = "Quarry ingests free-form text documents and scripts, splits them into \
    retrievable chunks, embeds and scores them against queries, and maintains a navigable \
    link graph between documents and chunks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/quarry.toml`. Database, chunking, retrieval,
    /// embedding, and ingest settings are read from this file.
    #[arg(long, global = true, default_value = "./config/quarry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, links, edges, vectors). This command is
    /// idempotent — running it multiple times is safe.
    Init,

    /// Ingest a file, a directory tree, or literal text.
    ///
    /// Chunks each document, extracts and resolves cross-references,
    /// stores everything atomically, then embeds inline if a provider
    /// is configured. Unchanged files (same content fingerprint) are
    /// skipped unless --force is given.
    Ingest {
        /// File or directory to ingest. Directories are walked with the
        /// include/exclude globs from config.
        path: Option<PathBuf>,

        /// Ingest this literal text instead of reading a file.
        /// Requires --source-path.
        #[arg(long)]
        text: Option<String>,

        /// Source path recorded for --text input (used as link target
        /// identity).
        #[arg(long)]
        source_path: Option<String>,

        /// Document kind: `reference` or `executable`.
        #[arg(long, default_value = "reference")]
        kind: String,

        /// Version labels to record (repeatable). Defaults to `unversioned`.
        #[arg(long = "version")]
        versions: Vec<String>,

        /// Free-form tags to record (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Re-ingest even when the content fingerprint is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Query indexed documents.
    ///
    /// Embeds the query, scores chunk- and document-level candidates
    /// with the hybrid pipeline (vector similarity, keyword overlap,
    /// version compatibility, link boosting), and prints grouped results.
    Search {
        /// The query string.
        query: String,

        /// Only return documents carrying at least one of these tags
        /// (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Requested version labels (repeatable). Documents with a
        /// disjoint version set are excluded.
        #[arg(long = "version")]
        versions: Vec<String>,

        /// Only return documents of this kind: `reference` or `executable`.
        #[arg(long)]
        kind: Option<String>,

        /// Maximum number of result groups to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print a document with its chunks and outgoing links.
    ///
    /// Accepts a document id or a chunk id (resolved to its parent).
    Get {
        /// Document or chunk id.
        id: String,
    },

    /// Walk the link graph outward from a document or chunk.
    Related {
        /// Document or chunk id to start from.
        id: String,

        /// Maximum number of hops to traverse.
        #[arg(long, default_value_t = 2)]
        depth: i64,
    },

    /// Remove a document and everything derived from it.
    ///
    /// Links from other documents that resolved here revert to dangling.
    Remove {
        /// Document id or source path.
        target: String,
    },

    /// Summarize what is indexed.
    ///
    /// Prints document, chunk, link, and edge counts plus embedding
    /// coverage.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            text,
            source_path,
            kind,
            versions,
            tags,
            force,
        } => {
            let kind = DocKind::parse(&kind)
                .ok_or_else(|| anyhow::anyhow!("Unknown kind: {}. Use reference or executable.", kind))?;
            let opts = IngestOptions {
                kind,
                versions,
                tags,
                force,
            };
            match (path, text) {
                (Some(path), None) => {
                    ingest::run_ingest(&cfg, &path, &opts).await?;
                }
                (None, Some(text)) => {
                    let source_path = source_path.ok_or_else(|| {
                        anyhow::anyhow!("--text requires --source-path")
                    })?;
                    ingest::run_ingest_text(&cfg, &source_path, &text, &opts).await?;
                }
                (Some(_), Some(_)) => {
                    anyhow::bail!("Give either a path or --text, not both.");
                }
                (None, None) => {
                    anyhow::bail!("Give a path to ingest, or --text with --source-path.");
                }
            }
        }
        Commands::Search {
            query,
            tags,
            versions,
            kind,
            limit,
        } => {
            let kind = match kind {
                Some(k) => Some(DocKind::parse(&k).ok_or_else(|| {
                    anyhow::anyhow!("Unknown kind: {}. Use reference or executable.", k)
                })?),
                None => None,
            };
            let filters = QueryFilters {
                tags,
                versions,
                kind,
            };
            search::run_search(&cfg, &query, &filters, limit).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, &id).await?;
        }
        Commands::Related { id, depth } => {
            related::run_related(&cfg, &id, depth).await?;
        }
        Commands::Remove { target } => {
            remove::run_remove(&cfg, &target).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

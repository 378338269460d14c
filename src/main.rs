//! # Codesift CLI (`sift`)
//!
//! The `sift` binary exercises the chunking and retrieval pipeline over a
//! configured directory tree. The similarity index lives in process
//! memory, so `search` ingests the tree first and then runs the query in
//! the same invocation.
//!
//! ## Usage
//!
//! ```bash
//! sift --config ./sift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sift ingest` | Chunk, embed, and index the configured tree |
//! | `sift search "<query>"` | Index the tree, then run a ranked search |
//! | `sift chunk <path>` | Chunk one file and print the pieces |

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use codesift::cache::EmbeddingCache;
use codesift::chunker::{chunk_document, ChunkLimits};
use codesift::config;
use codesift::fetch;
use codesift::index::MemoryIndex;
use codesift::ingest;
use codesift::models::SearchStrategy;
use codesift::search;

/// Codesift CLI — structure-aware chunking and ranked retrieval for
/// code-aware RAG pipelines.
#[derive(Parser)]
#[command(
    name = "sift",
    about = "Codesift — structure-aware chunking and ranked retrieval for code-aware RAG pipelines",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./sift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed, and index the configured tree.
    ///
    /// Scans the fetch root, splits every matching file into chunks,
    /// embeds them with the configured provider, and reports counts.
    Ingest {
        /// Show document and chunk counts without embedding anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the configured tree.
    ///
    /// Ingests the tree into an in-memory index, then embeds the query
    /// and prints ranked results.
    Search {
        /// The search query string.
        query: String,

        /// Search strategy: `precision`, `balanced`, or `recall`.
        #[arg(long, default_value = "balanced")]
        strategy: String,

        /// Explicit similarity threshold in [0.0, 1.0]; overrides the
        /// strategy default.
        #[arg(long)]
        threshold: Option<f32>,

        /// Restrict results to one source origin (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Chunk a single file and print the resulting pieces.
    ///
    /// Bypasses embedding entirely; useful for tuning chunk sizes.
    Chunk {
        /// Path to the file to chunk.
        path: PathBuf,
    },
}

fn parse_strategy(s: &str) -> anyhow::Result<SearchStrategy> {
    match s {
        "precision" => Ok(SearchStrategy::Precision),
        "balanced" => Ok(SearchStrategy::Balanced),
        "recall" => Ok(SearchStrategy::Recall),
        other => bail!(
            "Unknown strategy: '{}'. Use precision, balanced, or recall.",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dry_run } => {
            let index = MemoryIndex::new();
            ingest::run_ingest(&cfg, &index, dry_run).await?;
        }
        Commands::Search {
            query,
            strategy,
            threshold,
            sources,
            limit,
        } => {
            let strategy = parse_strategy(&strategy)?;
            let index = MemoryIndex::new();
            ingest::run_ingest(&cfg, &index, false).await?;

            let cache = EmbeddingCache::new(cfg.cache.capacity);
            let source_filter = if sources.is_empty() {
                None
            } else {
                Some(sources)
            };
            search::run_search(
                &cfg, &index, &cache, &query, strategy, threshold, source_filter, limit,
            )
            .await?;
        }
        Commands::Chunk { path } => {
            let mut fetcher = cfg.fetcher.clone();
            // Scan just the one file by rooting at its parent.
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))?;
            fetcher.root = parent.to_path_buf();
            fetcher.include_globs = vec![name.to_string_lossy().to_string()];

            let batch = fetch::scan_filesystem(&fetcher)?;
            let Some(document) = batch.documents.first() else {
                bail!("File not found or not readable: {}", path.display());
            };

            let limits = ChunkLimits {
                max_chunk_size: cfg.chunking.max_chunk_size,
                overlap_size: cfg.chunking.overlap_size,
            };
            let chunks = chunk_document(document, &limits)?;

            println!("chunk {} ({} pieces)", path.display(), chunks.len());
            for chunk in &chunks {
                let label = chunk
                    .metadata
                    .section
                    .as_deref()
                    .unwrap_or("(unlabeled)");
                println!(
                    "  [{} bytes] {} ({})",
                    chunk.metadata.byte_size,
                    label,
                    chunk.id
                );
            }
        }
    }

    Ok(())
}

//! # Codesift
//!
//! A chunking and retrieval-ranking core for code-aware RAG pipelines.
//!
//! Codesift turns source trees and documentation pages into size-bounded,
//! structure-aware chunks, embeds them through a pluggable provider, and
//! ranks retrieval candidates with adaptive thresholding, diversity
//! selection, and source-aware heuristics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Fetch   │──▶│ Chunk + Embed │──▶│  Similarity   │
//! │ FS tree  │   │  (splitter)   │   │    index      │
//! └──────────┘   └───────────────┘   └──────┬───────┘
//!                                           │
//!                     query ──▶ embed ──▶ rank (threshold,
//!                                          MMR, heuristics)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sift ingest --dry-run         # preview chunking of the configured tree
//! sift ingest                   # chunk, embed, and index
//! sift search "parse config"    # ranked retrieval
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`splitter`] | Low-level text splitting primitives |
//! | [`chunker`] | Document-to-chunk policies |
//! | [`rank`] | Threshold, diversity, and heuristic ranking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Similarity index trait and in-memory backend |
//! | [`cache`] | Query embedding cache |
//! | [`retry`] | Retry-with-backoff combinator |
//! | [`fetch`] | Filesystem source fetcher |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`search`] | Retrieval orchestration |
//! | [`error`] | Error taxonomies |

pub mod cache;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod index;
pub mod ingest;
pub mod models;
pub mod rank;
pub mod retry;
pub mod search;
pub mod splitter;

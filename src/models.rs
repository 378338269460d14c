//! Core data models used throughout codesift.
//!
//! These types represent the documents, chunks, candidates, and ranked
//! results that flow through the ingestion and retrieval pipeline.

use serde::Serialize;

/// A single heading parsed from a documentation page.
#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    /// ATX level: `#` = 1 through `######` = 6.
    pub level: u8,
    /// Heading text without the leading `#` markers.
    pub text: String,
}

/// Immutable input to the chunking engine, produced by a source fetcher.
#[derive(Debug, Clone)]
pub enum SourceDocument {
    /// A source-code file from a repository or local tree.
    CodeFile {
        /// Path relative to the fetch root (or repository root).
        path: String,
        /// Full decoded file text. Never binary; the fetcher filters that.
        text: String,
        /// Detected language (`"rust"`, `"python"`, …) when recognized.
        language: Option<String>,
        /// Size of `text` in bytes.
        byte_size: usize,
    },
    /// A documentation page (markdown or extracted page text).
    DocPage {
        /// Canonical page URL or `file://` path.
        url: String,
        /// Page title when known.
        title: Option<String>,
        /// Full page text or markdown.
        text: String,
        /// Ordered headings as they appear in the text.
        headings: Vec<Heading>,
    },
}

impl SourceDocument {
    /// Stable identity used for chunk ids and supersede-on-reingest:
    /// the relative path for code, the URL for documentation.
    pub fn origin(&self) -> &str {
        match self {
            SourceDocument::CodeFile { path, .. } => path,
            SourceDocument::DocPage { url, .. } => url,
        }
    }

    /// The raw text to be chunked.
    pub fn text(&self) -> &str {
        match self {
            SourceDocument::CodeFile { text, .. } => text,
            SourceDocument::DocPage { text, .. } => text,
        }
    }
}

/// What kind of content a chunk holds. Drives query-intent alignment
/// during heuristic reranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Code,
    Readme,
    Documentation,
}

/// Provenance of a chunk: where it came from and how to display that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    /// Origin URL or repository-relative path (the supersede key).
    pub origin: String,
    /// File path within the origin, when distinct from it.
    pub path: Option<String>,
    /// Page or file title, when known.
    pub title: Option<String>,
}

/// Derived metadata attached to every chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkMetadata {
    /// Detected language for code chunks.
    pub language: Option<String>,
    /// Always equals `content.len()`.
    pub byte_size: usize,
    /// SHA-256 hex of the chunk content only. Identical content across
    /// re-ingestions hashes identically, enabling unchanged-chunk detection.
    pub content_hash: String,
    /// Heading level for documentation chunks split on headings.
    pub heading_level: Option<u8>,
    /// Section label (heading text) for documentation chunks.
    pub section: Option<String>,
    /// Import/require targets scanned from code chunks.
    pub dependencies: Option<Vec<String>>,
}

/// The unit of retrieval.
///
/// Chunks from one document form an ordered sequence; ids are a
/// deterministic function of (origin, path-or-url, sequence index) so
/// re-chunking identical input reproduces identical ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub kind: ChunkKind,
    pub source: SourceRef,
    pub metadata: ChunkMetadata,
}

/// A raw similarity-query result from the index, before reranking.
#[derive(Debug, Clone)]
pub struct CandidateMatch {
    pub id: String,
    /// Raw similarity score in `[0, 1]`.
    pub score: f32,
    pub chunk: Chunk,
    /// Raw embedding values, present only when the query asked for them.
    /// Needed for diversity (MMR) selection.
    pub vector: Option<Vec<f32>>,
}

/// A candidate projected into display shape after ranking.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub content: String,
    pub source: SourceRef,
    pub language: Option<String>,
    pub section: Option<String>,
    pub heading_level: Option<u8>,
    /// The post-threshold raw similarity score. Diversity selection affects
    /// ordering and membership, never this value.
    pub score: f32,
}

/// Retrieval strategy: supplies default threshold and oversampling when the
/// query does not pin them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Fewer, higher-confidence results.
    Precision,
    Balanced,
    /// More, looser results.
    Recall,
}

impl SearchStrategy {
    /// Default similarity threshold for this mode.
    pub fn default_threshold(self) -> f32 {
        match self {
            SearchStrategy::Precision => 0.7,
            SearchStrategy::Balanced => 0.5,
            SearchStrategy::Recall => 0.3,
        }
    }

    /// Oversampling multiplier applied to `max_results` for the raw query.
    pub fn oversample_factor(self) -> usize {
        match self {
            SearchStrategy::Precision => 3,
            SearchStrategy::Balanced => 4,
            SearchStrategy::Recall => 5,
        }
    }
}

/// One retrieval request. Immutable per call.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub text: String,
    pub max_results: usize,
    /// Accept at least this many candidates before settling on a threshold
    /// rung (bounded above by `max_results`).
    pub min_results: usize,
    /// Restrict results to these source origins, when set.
    pub source_filter: Option<Vec<String>>,
    /// Explicit similarity threshold; overrides the strategy default.
    pub threshold: Option<f32>,
    pub strategy: SearchStrategy,
    /// MMR lambda: 0.0 = pure diversity, 1.0 = pure relevance.
    pub diversity_lambda: f32,
    /// At most this many results per distinct source origin.
    pub max_per_source: usize,
    /// Collapse identical (content hash, source path) candidates.
    pub dedupe: bool,
    /// Walk the threshold ladder down when too few candidates pass.
    pub adaptive_threshold: bool,
}

impl RetrievalQuery {
    /// A query with the documented defaults for everything but the text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_results: 8,
            min_results: 3,
            source_filter: None,
            threshold: None,
            strategy: SearchStrategy::Balanced,
            diversity_lambda: 0.7,
            max_per_source: 2,
            dedupe: true,
            adaptive_threshold: true,
        }
    }

    /// The threshold the ranking engine starts from: explicit value if set,
    /// otherwise the strategy default.
    pub fn effective_threshold(&self) -> f32 {
        self.threshold.unwrap_or(self.strategy.default_threshold())
    }
}

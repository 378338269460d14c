//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: fetch → chunk → embed → index. Each
//! document's prior chunk set is deleted before its new chunks are
//! upserted, so re-ingesting a changed file supersedes the old content
//! instead of accumulating stale chunks. Embedding calls go through the
//! retry combinator; a document that still fails after retries aborts the
//! run rather than leaving the index half-written for that file.

use anyhow::{bail, Context, Result};

use crate::chunker::{chunk_batch, ChunkLimits};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::EmbedError;
use crate::fetch;
use crate::index::{ChunkVector, SimilarityIndex};
use crate::models::Chunk;
use crate::retry::{self, RetryPolicy};

/// Counters from one ingest run.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks_written: usize,
    pub chunks_superseded: u64,
    pub warnings: Vec<String>,
}

/// Chunk and index a set of already-fetched documents.
///
/// Exposed separately from [`run_ingest`] so callers can feed documents
/// from any source, not just the filesystem fetcher.
///
/// Every decodable document supersedes its prior chunk set by origin,
/// including a document that now yields zero chunks: emptying a file must
/// remove its stale chunks from the index. Only undecodable documents are
/// skipped without touching what is already stored.
pub async fn ingest_documents(
    documents: &[crate::models::SourceDocument],
    limits: &ChunkLimits,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
    policy: RetryPolicy,
    index: &dyn SimilarityIndex,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for document in documents {
        let batch = chunk_batch(std::slice::from_ref(document), limits)?;
        if !batch.warnings.is_empty() {
            summary.warnings.extend(batch.warnings);
            continue;
        }
        let chunks = batch.chunks.into_iter().next().unwrap_or_default();

        let vectors = embed_chunks(&chunks, provider, batch_size, policy)
            .await
            .with_context(|| format!("Failed to embed chunks for {}", document.origin()))?;

        summary.chunks_superseded += index.delete_by_source(document.origin()).await?;

        if !chunks.is_empty() {
            let items: Vec<ChunkVector> = chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| ChunkVector { chunk, vector })
                .collect();
            index.upsert(&items).await?;
            summary.chunks_written += items.len();
        }

        summary.documents += 1;
    }

    Ok(summary)
}

/// Embed a document's chunks in provider-sized batches, retrying
/// transient failures.
async fn embed_chunks(
    chunks: &[Chunk],
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
    policy: RetryPolicy,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(chunks.len());

    for window in chunks.chunks(batch_size) {
        let texts: Vec<String> = window.iter().map(|c| c.content.clone()).collect();
        let embedded = retry::with_backoff(policy, EmbedError::is_retryable, || {
            provider.embed_batch(&texts)
        })
        .await?;
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// CLI entry: scan the configured tree, chunk, embed, and index it.
pub async fn run_ingest(config: &Config, index: &dyn SimilarityIndex, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Ingest requires embeddings. Set [embedding] provider in config.");
    }

    let fetched = fetch::scan_filesystem(&config.fetcher)?;
    for skip in &fetched.skipped {
        tracing::warn!(reason = %skip, "skipped file");
    }

    let limits = ChunkLimits {
        max_chunk_size: config.chunking.max_chunk_size,
        overlap_size: config.chunking.overlap_size,
    };

    if dry_run {
        let batch = chunk_batch(&fetched.documents, &limits)?;
        println!("ingest {} (dry-run)", config.fetcher.root.display());
        println!("  documents found: {}", fetched.documents.len());
        println!("  estimated chunks: {}", batch.total_chunks());
        println!("  skipped: {}", fetched.skipped.len());
        return Ok(());
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let policy = RetryPolicy {
        max_attempts: config.embedding.max_retries.max(1),
        ..RetryPolicy::default()
    };

    let summary = ingest_documents(
        &fetched.documents,
        &limits,
        provider.as_ref(),
        config.embedding.batch_size,
        policy,
        index,
    )
    .await?;

    for warning in &summary.warnings {
        tracing::warn!(reason = %warning, "skipped document");
    }

    println!("ingest {}", config.fetcher.root.display());
    println!("  documents indexed: {}", summary.documents);
    println!("  chunks written: {}", summary.chunks_written);
    println!("  chunks superseded: {}", summary.chunks_superseded);
    println!("  skipped files: {}", fetched.skipped.len());
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use crate::models::SourceDocument;
    use async_trait::async_trait;

    /// Deterministic provider: vector derives from content length.
    struct StubProvider;

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    fn code_doc(path: &str, text: &str) -> SourceDocument {
        SourceDocument::CodeFile {
            path: path.to_string(),
            text: text.to_string(),
            language: Some("rust".to_string()),
            byte_size: text.len(),
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_all_chunks() {
        let index = MemoryIndex::new();
        let docs = vec![
            code_doc("a.rs", "fn a() {}\n"),
            code_doc("b.rs", "fn b() {}\n"),
        ];
        let limits = ChunkLimits::new(1500);

        let summary = ingest_documents(
            &docs,
            &limits,
            &StubProvider,
            64,
            RetryPolicy::default(),
            &index,
        )
        .await
        .unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.chunks_written, 2);
        assert_eq!(index.stats().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_reingest_supersedes_old_chunks() {
        let index = MemoryIndex::new();
        let limits = ChunkLimits::new(1500);

        let first = vec![code_doc("a.rs", "fn old() {}\n")];
        ingest_documents(&first, &limits, &StubProvider, 64, RetryPolicy::default(), &index)
            .await
            .unwrap();

        let second = vec![code_doc("a.rs", "fn renamed() {}\n")];
        let summary =
            ingest_documents(&second, &limits, &StubProvider, 64, RetryPolicy::default(), &index)
                .await
                .unwrap();

        assert_eq!(summary.chunks_superseded, 1);
        assert_eq!(index.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_emptied_source_clears_prior_chunks() {
        let index = MemoryIndex::new();
        let limits = ChunkLimits::new(1500);

        let full = vec![code_doc("a.rs", "fn present() {}\n")];
        ingest_documents(&full, &limits, &StubProvider, 64, RetryPolicy::default(), &index)
            .await
            .unwrap();
        assert_eq!(index.stats().await.unwrap().count, 1);

        // The file was emptied; re-ingestion must still supersede.
        let emptied = vec![code_doc("a.rs", "")];
        let summary =
            ingest_documents(&emptied, &limits, &StubProvider, 64, RetryPolicy::default(), &index)
                .await
                .unwrap();

        assert_eq!(summary.chunks_superseded, 1);
        assert_eq!(summary.chunks_written, 0);
        assert_eq!(index.stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_binary_document_becomes_warning() {
        let index = MemoryIndex::new();
        let docs = vec![code_doc("bad.rs", "fn ok() {}\0corrupt")];
        let limits = ChunkLimits::new(1500);

        let summary = ingest_documents(
            &docs,
            &limits,
            &StubProvider,
            64,
            RetryPolicy::default(),
            &index,
        )
        .await
        .unwrap();

        assert_eq!(summary.documents, 0);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(index.stats().await.unwrap().count, 0);
    }
}

//! Similarity index abstraction.
//!
//! The [`SimilarityIndex`] trait defines the narrow surface the pipeline
//! needs from a vector store: batched upsert, one oversampled similarity
//! query, deletion by source, and stats. Persistence and availability are
//! the backend's concern; [`MemoryIndex`] is the reference implementation
//! (brute-force cosine scan behind an `RwLock`), used by tests and small
//! local corpora.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CandidateMatch, Chunk};
use crate::rank::cosine_similarity;

/// One chunk paired with its embedding, ready to write.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Parameters for one similarity query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    /// How many raw matches to return (already oversampled by the caller).
    pub top_k: usize,
    /// Restrict matches to these source origins, when set.
    pub source_filter: Option<Vec<String>>,
    /// Return raw embedding values with each match (needed for MMR).
    pub include_vectors: bool,
}

/// Index size summary.
#[derive(Debug, Clone, Copy)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
}

/// Abstract vector index backend.
///
/// `query` must return matches sorted by descending raw score.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Insert or replace a batch of chunk vectors, keyed by chunk id.
    async fn upsert(&self, batch: &[ChunkVector]) -> Result<()>;

    /// Run one similarity query.
    async fn query(&self, request: &QueryRequest) -> Result<Vec<CandidateMatch>>;

    /// Delete every chunk whose source origin matches. Returns the count
    /// removed. Callers use this to supersede a document's prior chunk set
    /// on re-ingestion.
    async fn delete_by_source(&self, origin: &str) -> Result<u64>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// In-memory reference index: brute-force cosine similarity over all
/// stored vectors.
pub struct MemoryIndex {
    entries: RwLock<Vec<ChunkVector>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilarityIndex for MemoryIndex {
    async fn upsert(&self, batch: &[ChunkVector]) -> Result<()> {
        let mut entries = self.entries.write().expect("index lock poisoned");
        for item in batch {
            entries.retain(|e| e.chunk.id != item.chunk.id);
            entries.push(item.clone());
        }
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<Vec<CandidateMatch>> {
        let entries = self.entries.read().expect("index lock poisoned");

        let mut matches: Vec<CandidateMatch> = entries
            .iter()
            .filter(|e| match &request.source_filter {
                Some(origins) => origins.iter().any(|o| *o == e.chunk.source.origin),
                None => true,
            })
            .map(|e| {
                // Clamp into [0, 1]: opposite-direction vectors score 0.
                let score = cosine_similarity(&request.vector, &e.vector).max(0.0);
                CandidateMatch {
                    id: e.chunk.id.clone(),
                    score,
                    chunk: e.chunk.clone(),
                    vector: request.include_vectors.then(|| e.vector.clone()),
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(request.top_k);

        Ok(matches)
    }

    async fn delete_by_source(&self, origin: &str) -> Result<u64> {
        let mut entries = self.entries.write().expect("index lock poisoned");
        let before = entries.len();
        entries.retain(|e| e.chunk.source.origin != origin);
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let entries = self.entries.read().expect("index lock poisoned");
        let dimension = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        Ok(IndexStats {
            count: entries.len(),
            dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkKind, ChunkMetadata, SourceRef};

    fn chunk_vector(id: &str, origin: &str, vector: Vec<f32>) -> ChunkVector {
        ChunkVector {
            chunk: Chunk {
                id: id.to_string(),
                content: format!("content of {}", id),
                kind: ChunkKind::Code,
                source: SourceRef {
                    origin: origin.to_string(),
                    path: Some(origin.to_string()),
                    title: None,
                },
                metadata: ChunkMetadata {
                    language: None,
                    byte_size: 0,
                    content_hash: id.to_string(),
                    heading_level: None,
                    section: None,
                    dependencies: None,
                },
            },
            vector,
        }
    }

    fn request(vector: Vec<f32>, top_k: usize) -> QueryRequest {
        QueryRequest {
            vector,
            top_k,
            source_filter: None,
            include_vectors: false,
        }
    }

    #[tokio::test]
    async fn test_query_sorted_descending() {
        let index = MemoryIndex::new();
        index
            .upsert(&[
                chunk_vector("far", "a.rs", vec![0.0, 1.0]),
                chunk_vector("near", "b.rs", vec![1.0, 0.0]),
                chunk_vector("mid", "c.rs", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let matches = index.query(&request(vec![1.0, 0.0], 10)).await.unwrap();
        assert_eq!(matches[0].id, "near");
        assert_eq!(matches[1].id, "mid");
        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let index = MemoryIndex::new();
        index
            .upsert(&[chunk_vector("x", "a.rs", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(&[chunk_vector("x", "a.rs", vec![0.0, 1.0])])
            .await
            .unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.dimension, 2);
    }

    #[tokio::test]
    async fn test_source_filter() {
        let index = MemoryIndex::new();
        index
            .upsert(&[
                chunk_vector("a1", "a.rs", vec![1.0, 0.0]),
                chunk_vector("b1", "b.rs", vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let mut req = request(vec![1.0, 0.0], 10);
        req.source_filter = Some(vec!["a.rs".to_string()]);
        let matches = index.query(&req).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a1");
    }

    #[tokio::test]
    async fn test_include_vectors() {
        let index = MemoryIndex::new();
        index
            .upsert(&[chunk_vector("v", "a.rs", vec![0.5, 0.5])])
            .await
            .unwrap();

        let without = index.query(&request(vec![1.0, 0.0], 1)).await.unwrap();
        assert!(without[0].vector.is_none());

        let mut req = request(vec![1.0, 0.0], 1);
        req.include_vectors = true;
        let with = index.query(&req).await.unwrap();
        assert_eq!(with[0].vector.as_deref(), Some(&[0.5, 0.5][..]));
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let index = MemoryIndex::new();
        index
            .upsert(&[
                chunk_vector("a1", "a.rs", vec![1.0]),
                chunk_vector("a2", "a.rs", vec![1.0]),
                chunk_vector("b1", "b.rs", vec![1.0]),
            ])
            .await
            .unwrap();

        let removed = index.delete_by_source("a.rs").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(index.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_scores_clamped_non_negative() {
        let index = MemoryIndex::new();
        index
            .upsert(&[chunk_vector("opp", "a.rs", vec![-1.0, 0.0])])
            .await
            .unwrap();
        let matches = index.query(&request(vec![1.0, 0.0], 1)).await.unwrap();
        assert_eq!(matches[0].score, 0.0);
    }
}

//! Retrieval orchestration.
//!
//! Turns a query string into ranked results: embed the query (through the
//! injected cache), pull an oversampled candidate set from the index, then
//! hand the candidates to the ranking engine. The index query itself is
//! unthresholded; all relevance decisions happen in [`crate::rank`] so the
//! adaptive ladder sees the full candidate pool.

use anyhow::{bail, Result};

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::EmbedError;
use crate::index::{QueryRequest, SimilarityIndex};
use crate::models::{RetrievalQuery, SearchStrategy};
use crate::rank::{self, RankedOutcome};
use crate::retry::{self, RetryPolicy};

/// Execute one retrieval query against the index.
pub async fn run_query(
    query: &RetrievalQuery,
    provider: &dyn EmbeddingProvider,
    cache: &EmbeddingCache,
    index: &dyn SimilarityIndex,
    hard_cap: usize,
    policy: RetryPolicy,
) -> Result<RankedOutcome> {
    let query_vector = embed_cached(&query.text, provider, cache, policy).await?;

    let top_k = (query.max_results * query.strategy.oversample_factor()).min(hard_cap.max(1));
    let candidates = index
        .query(&QueryRequest {
            vector: query_vector.clone(),
            top_k,
            source_filter: query.source_filter.clone(),
            include_vectors: true,
        })
        .await?;

    Ok(rank::rerank(candidates, &query_vector, query))
}

/// Embed a query string, consulting the cache first.
async fn embed_cached(
    text: &str,
    provider: &dyn EmbeddingProvider,
    cache: &EmbeddingCache,
    policy: RetryPolicy,
) -> Result<Vec<f32>> {
    if let Some(vector) = cache.get(text) {
        return Ok(vector);
    }

    let vector = retry::with_backoff(policy, EmbedError::is_retryable, || {
        provider.embed_query(text)
    })
    .await?;
    cache.insert(text, vector.clone());
    Ok(vector)
}

/// CLI entry: run one search and print the ranked results.
#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    config: &Config,
    index: &dyn SimilarityIndex,
    cache: &EmbeddingCache,
    text: &str,
    strategy: SearchStrategy,
    threshold: Option<f32>,
    source_filter: Option<Vec<String>>,
    limit: Option<usize>,
) -> Result<()> {
    if text.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }
    if let Some(t) = threshold {
        if !(0.0..=1.0).contains(&t) {
            bail!("Threshold must be in [0.0, 1.0], got {}", t);
        }
    }

    let query = RetrievalQuery {
        max_results: limit.unwrap_or(config.retrieval.max_results),
        min_results: config.retrieval.min_results,
        source_filter,
        threshold,
        strategy,
        diversity_lambda: config.retrieval.diversity_lambda,
        max_per_source: config.retrieval.max_per_source,
        dedupe: config.retrieval.dedupe,
        adaptive_threshold: config.retrieval.adaptive_threshold,
        ..RetrievalQuery::new(text)
    };

    let provider = embedding::create_provider(&config.embedding)?;
    let policy = RetryPolicy {
        max_attempts: config.embedding.max_retries.max(1),
        ..RetryPolicy::default()
    };

    let outcome = run_query(
        &query,
        provider.as_ref(),
        cache,
        index,
        config.retrieval.hard_cap,
        policy,
    )
    .await?;

    if let Some(ref note) = outcome.note {
        println!("note: {}", note);
    }
    if outcome.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in outcome.results.iter().enumerate() {
        let label = result
            .source
            .path
            .as_deref()
            .unwrap_or(&result.source.origin);
        println!("{}. [{:.2}] {}", i + 1, result.score, label);
        if let Some(ref section) = result.section {
            println!("    section: {}", section);
        }
        if let Some(ref language) = result.language {
            println!("    language: {}", language);
        }
        let excerpt: String = result.content.chars().take(160).collect();
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!();
    }

    Ok(())
}

//! The similarity reranker.
//!
//! Turns an oversampled raw candidate set into the final ranked result list:
//!
//! 1. **Adaptive thresholding** — walk a descending threshold ladder until
//!    enough candidates pass; never return zero results from threshold
//!    miscalibration alone.
//! 2. **Deduplication** — collapse candidates with identical content hash
//!    and source path, keeping the highest-scoring instance.
//! 3. **Diversity selection** — MMR-style greedy selection when raw vectors
//!    are available for every survivor; otherwise a heuristic rescoring
//!    pass with per-source capping and backfill.
//!
//! This is a stateless pure function per invocation. Reported scores are the
//! post-threshold raw similarity scores; diversity affects ordering and
//! membership only.

use std::collections::HashMap;

use crate::models::{CandidateMatch, ChunkKind, RankedResult, RetrievalQuery};

/// Fixed fallback rungs walked below the requested threshold.
const THRESHOLD_LADDER: [f32; 4] = [0.6, 0.45, 0.3, 0.15];

/// Query terms that suggest the caller wants code.
const CODE_INTENT_TERMS: [&str; 10] = [
    "fn", "function", "class", "impl", "struct", "method", "api", "code", "type", "error",
];

/// Query terms that suggest the caller wants prose documentation.
const DOC_INTENT_TERMS: [&str; 9] = [
    "how", "what", "why", "when", "guide", "tutorial", "docs", "documentation", "explain",
];

/// Final output of [`rerank`]: ordered results plus an explanatory note when
/// the list is empty.
#[derive(Debug)]
pub struct RankedOutcome {
    pub results: Vec<RankedResult>,
    pub note: Option<String>,
}

/// Cosine similarity with zero-norm safety: returns `0.0` (never NaN) for
/// empty, mismatched-length, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Rank oversampled candidates into at most `query.max_results` results.
///
/// Never errors: an empty outcome carries a human-readable note instead.
pub fn rerank(
    candidates: Vec<CandidateMatch>,
    query_vector: &[f32],
    query: &RetrievalQuery,
) -> RankedOutcome {
    if candidates.is_empty() {
        return RankedOutcome {
            results: Vec::new(),
            note: Some("no relevant results; try lowering the threshold".to_string()),
        };
    }

    let mut survivors = apply_threshold(&candidates, query);

    if query.dedupe {
        survivors = dedupe(survivors);
    }

    let selected = if survivors.iter().all(|c| c.vector.is_some()) {
        mmr_select(
            survivors,
            query_vector,
            query.diversity_lambda,
            query.max_results,
        )
    } else {
        heuristic_select(survivors, query)
    };

    if selected.is_empty() {
        return RankedOutcome {
            results: Vec::new(),
            note: Some("no relevant results; try lowering the threshold".to_string()),
        };
    }

    let results = selected
        .into_iter()
        .map(|c| RankedResult {
            content: c.chunk.content.clone(),
            source: c.chunk.source.clone(),
            language: c.chunk.metadata.language.clone(),
            section: c.chunk.metadata.section.clone(),
            heading_level: c.chunk.metadata.heading_level,
            score: c.score,
        })
        .collect();

    RankedOutcome {
        results,
        note: None,
    }
}

/// Step 1: adaptive thresholding.
///
/// Walk the requested threshold, then the fixed rungs strictly below it;
/// accept the first rung where the pass count reaches
/// `min(min_results, max_results)`. With adaptive relaxation disabled only
/// the requested threshold applies. If no rung passes anything at all, fall
/// back to the top `max_results` by raw score.
fn apply_threshold(candidates: &[CandidateMatch], query: &RetrievalQuery) -> Vec<CandidateMatch> {
    let requested = query.effective_threshold();
    let need = query.min_results.min(query.max_results).max(1);

    let mut ladder = vec![requested];
    if query.adaptive_threshold {
        ladder.extend(THRESHOLD_LADDER.iter().copied().filter(|t| *t < requested));
    }

    let mut best_nonempty: Option<Vec<CandidateMatch>> = None;

    for rung in ladder {
        let passing: Vec<CandidateMatch> = candidates
            .iter()
            .filter(|c| c.score >= rung)
            .cloned()
            .collect();
        if passing.len() >= need {
            return passing;
        }
        if !passing.is_empty() && best_nonempty.is_none() {
            best_nonempty = Some(passing);
        }
    }

    if let Some(partial) = best_nonempty {
        return partial;
    }

    // Threshold miscalibration: take the best of what exists.
    let mut by_score: Vec<CandidateMatch> = candidates.to_vec();
    sort_desc(&mut by_score);
    by_score.truncate(query.max_results);
    by_score
}

/// Step 2a: MMR greedy selection.
///
/// Repeatedly pick the unselected candidate maximizing
/// `λ·relevance − (1−λ)·max-similarity-to-selected`. With λ = 1 this
/// degenerates to pure descending relevance.
fn mmr_select(
    candidates: Vec<CandidateMatch>,
    query_vector: &[f32],
    lambda: f32,
    max_results: usize,
) -> Vec<CandidateMatch> {
    let lambda = lambda.clamp(0.0, 1.0);
    let k = max_results.min(candidates.len());

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(c.vector.as_deref().unwrap_or(&[]), query_vector))
        .collect();

    let mut selected: Vec<CandidateMatch> = Vec::with_capacity(k);
    let mut selected_vecs: Vec<Vec<f32>> = Vec::with_capacity(k);
    let mut remaining: Vec<(usize, CandidateMatch)> = candidates.into_iter().enumerate().collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, (orig, candidate)) in remaining.iter().enumerate() {
            let vector = candidate.vector.as_deref().unwrap_or(&[]);
            let redundancy = selected_vecs
                .iter()
                .map(|s| cosine_similarity(vector, s))
                .fold(0.0f32, f32::max);
            let mmr = lambda * relevance[*orig] - (1.0 - lambda) * redundancy;
            if mmr > best_score {
                best_score = mmr;
                best_pos = pos;
            }
        }

        let (_, best) = remaining.remove(best_pos);
        selected_vecs.push(best.vector.clone().unwrap_or_default());
        selected.push(best);
    }

    selected
}

/// Step 2b: heuristic rescoring when raw vectors are unavailable.
///
/// Adjusts each candidate's score by bounded multiplicative factors, sorts
/// stably (equal adjusted scores keep arrival order), applies per-source
/// capping, and backfills from capped-out candidates when the cap starves
/// the result set.
fn heuristic_select(candidates: Vec<CandidateMatch>, query: &RetrievalQuery) -> Vec<CandidateMatch> {
    let query_lower = query.text.to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    let code_intent = terms.iter().any(|t| CODE_INTENT_TERMS.contains(t));
    let doc_intent = terms.iter().any(|t| DOC_INTENT_TERMS.contains(t));

    let mut scored: Vec<(f32, CandidateMatch)> = candidates
        .into_iter()
        .map(|c| {
            let adjusted = c.score
                * length_factor(c.chunk.content.len())
                * overlap_factor(&c.chunk.content, &terms)
                * intent_factor(c.chunk.kind, code_intent, doc_intent)
                * section_factor(&c);
            (adjusted, c)
        })
        .collect();

    // Stable sort: identical adjusted scores keep original candidate order.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut picked: Vec<CandidateMatch> = Vec::new();
    let mut overflow: Vec<CandidateMatch> = Vec::new();
    let mut per_source: HashMap<String, usize> = HashMap::new();

    for (_, candidate) in scored {
        if picked.len() >= query.max_results {
            break;
        }
        let count = per_source
            .entry(candidate.chunk.source.origin.clone())
            .or_insert(0);
        if *count < query.max_per_source {
            *count += 1;
            picked.push(candidate);
        } else {
            overflow.push(candidate);
        }
    }

    // Backfill, highest remaining adjusted score first, ignoring source.
    let mut backfill = overflow.into_iter();
    while picked.len() < query.max_results {
        match backfill.next() {
            Some(candidate) => picked.push(candidate),
            None => break,
        }
    }

    picked
}

fn length_factor(len: usize) -> f32 {
    if len < 80 {
        0.7
    } else if (200..=1500).contains(&len) {
        1.1
    } else {
        1.0
    }
}

fn overlap_factor(content: &str, terms: &[&str]) -> f32 {
    if terms.is_empty() {
        return 1.0;
    }
    let content_lower = content.to_lowercase();
    let matched = terms.iter().filter(|t| content_lower.contains(**t)).count();
    1.0 + 0.3 * (matched as f32 / terms.len() as f32)
}

fn intent_factor(kind: ChunkKind, code_intent: bool, doc_intent: bool) -> f32 {
    match kind {
        ChunkKind::Code if code_intent => 1.15,
        ChunkKind::Code if doc_intent => 0.9,
        ChunkKind::Documentation | ChunkKind::Readme if doc_intent => 1.15,
        ChunkKind::Documentation | ChunkKind::Readme if code_intent => 0.9,
        _ => 1.0,
    }
}

fn section_factor(candidate: &CandidateMatch) -> f32 {
    if candidate.chunk.metadata.section.is_some() {
        1.05
    } else {
        1.0
    }
}

/// Step 3 support: collapse identical (content hash, source path) pairs,
/// keeping the highest-scoring instance. Runs on the candidate set so
/// diversity selection can still fill `max_results`.
fn dedupe(candidates: Vec<CandidateMatch>) -> Vec<CandidateMatch> {
    let mut best: HashMap<(String, Option<String>), usize> = HashMap::new();
    let mut keep: Vec<Option<CandidateMatch>> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let key = (
            candidate.chunk.metadata.content_hash.clone(),
            candidate.chunk.source.path.clone(),
        );
        match best.get(&key) {
            Some(&idx) => {
                let existing = keep[idx].as_ref().map(|c| c.score).unwrap_or(f32::MIN);
                if candidate.score > existing {
                    keep[idx] = Some(candidate);
                }
            }
            None => {
                best.insert(key, keep.len());
                keep.push(Some(candidate));
            }
        }
    }

    keep.into_iter().flatten().collect()
}

fn sort_desc(candidates: &mut [CandidateMatch]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata, SourceRef};

    fn chunk(id: &str, origin: &str, content: &str, kind: ChunkKind) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            kind,
            source: SourceRef {
                origin: origin.to_string(),
                path: Some(origin.to_string()),
                title: None,
            },
            metadata: ChunkMetadata {
                language: None,
                byte_size: content.len(),
                content_hash: format!("hash-{}", id),
                heading_level: None,
                section: None,
                dependencies: None,
            },
        }
    }

    fn candidate(id: &str, origin: &str, score: f32) -> CandidateMatch {
        CandidateMatch {
            id: id.to_string(),
            score,
            chunk: chunk(id, origin, "some reasonably sized content for ranking tests", ChunkKind::Code),
            vector: None,
        }
    }

    fn candidate_with_vector(id: &str, score: f32, vector: Vec<f32>) -> CandidateMatch {
        CandidateMatch {
            vector: Some(vector),
            ..candidate(id, "src/a.rs", score)
        }
    }

    fn query(max_results: usize) -> RetrievalQuery {
        let mut q = RetrievalQuery::new("test query");
        q.max_results = max_results;
        q
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert!(!cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]).is_nan());
    }

    #[test]
    fn test_cosine_identical_direction() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_candidates_safe() {
        let outcome = rerank(Vec::new(), &[1.0, 0.0], &query(5));
        assert!(outcome.results.is_empty());
        assert!(outcome.note.is_some());
    }

    #[test]
    fn test_threshold_monotonicity_without_relaxation() {
        let candidates: Vec<CandidateMatch> = (0..10)
            .map(|i| candidate(&format!("c{}", i), "src/a.rs", 0.1 * i as f32))
            .collect();
        let mut q = query(10);
        q.adaptive_threshold = false;
        q.max_per_source = 100;

        let mut previous = usize::MAX;
        for t in [0.2f32, 0.4, 0.6, 0.8] {
            q.threshold = Some(t);
            let passing = apply_threshold(&candidates, &q).len();
            assert!(passing <= previous, "count rose as threshold rose");
            previous = passing;
        }
    }

    #[test]
    fn test_adaptive_relaxation_reaches_min_results() {
        // Scenario 4: threshold 0.9 passes nothing; 10 candidates at 0.75.
        let candidates: Vec<CandidateMatch> = (0..10)
            .map(|i| candidate(&format!("c{}", i), &format!("src/{}.rs", i), 0.75))
            .collect();
        let mut q = query(3);
        q.min_results = 3;
        q.threshold = Some(0.9);

        let outcome = rerank(candidates, &[], &q);
        assert_eq!(outcome.results.len(), 3);
        for r in &outcome.results {
            assert!((r.score - 0.75).abs() < 1e-6);
        }
    }

    #[test]
    fn test_relaxation_disabled_falls_back_to_top_scores() {
        let candidates: Vec<CandidateMatch> = (0..10)
            .map(|i| candidate(&format!("c{}", i), &format!("src/{}.rs", i), 0.5))
            .collect();
        let mut q = query(4);
        q.threshold = Some(0.9);
        q.adaptive_threshold = false;

        // Nothing passes 0.9, so the no-zero-results fallback applies.
        let outcome = rerank(candidates, &[], &q);
        assert_eq!(outcome.results.len(), 4);
    }

    #[test]
    fn test_mmr_lambda_one_matches_relevance_order() {
        let qvec = vec![1.0, 0.0];
        let candidates = vec![
            candidate_with_vector("far", 0.5, vec![0.3, 0.7]),
            candidate_with_vector("near", 0.9, vec![0.95, 0.05]),
            candidate_with_vector("mid", 0.7, vec![0.7, 0.3]),
        ];
        let mut q = query(3);
        q.diversity_lambda = 1.0;
        q.threshold = Some(0.0);

        let outcome = rerank(candidates, &qvec, &q);
        let ids: Vec<&str> = outcome.results.iter().map(|r| r.source.origin.as_str()).collect();
        assert_eq!(ids.len(), 3);
        // Pure relevance: sorted by cosine to the query vector.
        assert_eq!(outcome.results[0].content.len(), outcome.results[1].content.len());
        let scores: Vec<f32> = outcome.results.iter().map(|r| r.score).collect();
        assert!((scores[0] - 0.9).abs() < 1e-6);
        assert!((scores[1] - 0.7).abs() < 1e-6);
        assert!((scores[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mmr_prefers_diverse_over_near_duplicate() {
        let qvec = vec![1.0, 0.0, 0.0];
        let candidates = vec![
            candidate_with_vector("a", 0.95, vec![0.99, 0.01, 0.0]),
            candidate_with_vector("b", 0.94, vec![0.98, 0.02, 0.0]),
            candidate_with_vector("c", 0.70, vec![0.0, 0.0, 1.0]),
        ];
        let mut q = query(2);
        q.diversity_lambda = 0.5;
        q.threshold = Some(0.0);

        let outcome = rerank(candidates, &qvec, &q);
        assert_eq!(outcome.results.len(), 2);
        let second_score = outcome.results[1].score;
        assert!((second_score - 0.70).abs() < 1e-6, "near-duplicate beat the diverse candidate");
    }

    #[test]
    fn test_per_source_cap_and_total() {
        // Scenario 3: 20 candidates, 3 sources (7/7/6), cap 2, max 5.
        let mut candidates = Vec::new();
        let mut n = 0;
        for (source, count) in [("a", 7), ("b", 7), ("c", 6)] {
            for i in 0..count {
                candidates.push(candidate(
                    &format!("{}{}", source, i),
                    &format!("src/{}.rs", source),
                    0.9 - 0.01 * n as f32,
                ));
                n += 1;
            }
        }
        let mut q = query(5);
        q.max_per_source = 2;
        q.threshold = Some(0.0);

        let outcome = rerank(candidates, &[], &q);
        assert_eq!(outcome.results.len(), 5);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for r in &outcome.results {
            *counts.entry(r.source.origin.as_str()).or_insert(0) += 1;
        }
        for (_, c) in counts {
            assert!(c <= 2);
        }
    }

    #[test]
    fn test_backfill_when_cap_starves_results() {
        // One source only: cap 2 but max_results 4, so backfill must kick in.
        let candidates: Vec<CandidateMatch> = (0..6)
            .map(|i| candidate(&format!("c{}", i), "src/only.rs", 0.8 - 0.05 * i as f32))
            .collect();
        let mut q = query(4);
        q.max_per_source = 2;
        q.threshold = Some(0.0);

        let outcome = rerank(candidates, &[], &q);
        assert_eq!(outcome.results.len(), 4);
        // Backfill keeps descending score order within each pass.
        assert!(outcome.results[0].score >= outcome.results[1].score);
    }

    #[test]
    fn test_stable_tiebreak_by_arrival_order() {
        let mut q = query(3);
        q.threshold = Some(0.0);
        q.max_per_source = 10;
        let candidates = vec![
            candidate("first", "src/a.rs", 0.5),
            candidate("second", "src/a.rs", 0.5),
            candidate("third", "src/a.rs", 0.5),
        ];
        let outcome = rerank(candidates.clone(), &[], &q);
        let again = rerank(candidates, &[], &q);
        let order: Vec<f32> = outcome.results.iter().map(|r| r.score).collect();
        let order_again: Vec<f32> = again.results.iter().map(|r| r.score).collect();
        assert_eq!(order, order_again);
        assert_eq!(outcome.results.len(), 3);
    }

    #[test]
    fn test_dedupe_keeps_highest_score() {
        let mut a = candidate("dup1", "src/a.rs", 0.6);
        let mut b = candidate("dup2", "src/a.rs", 0.8);
        a.chunk.metadata.content_hash = "same".to_string();
        b.chunk.metadata.content_hash = "same".to_string();
        let mut q = query(5);
        q.threshold = Some(0.0);

        let outcome = rerank(vec![a, b], &[], &q);
        assert_eq!(outcome.results.len(), 1);
        assert!((outcome.results[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_dedupe_can_be_disabled() {
        let mut a = candidate("dup1", "src/a.rs", 0.6);
        let mut b = candidate("dup2", "src/a.rs", 0.8);
        a.chunk.metadata.content_hash = "same".to_string();
        b.chunk.metadata.content_hash = "same".to_string();
        let mut q = query(5);
        q.threshold = Some(0.0);
        q.dedupe = false;
        q.max_per_source = 10;

        let outcome = rerank(vec![a, b], &[], &q);
        assert_eq!(outcome.results.len(), 2);
    }

    #[test]
    fn test_intent_alignment_favors_code_for_code_queries() {
        let mut code = candidate("code", "src/a.rs", 0.7);
        code.chunk.kind = ChunkKind::Code;
        let mut doc = candidate("doc", "https://docs/x", 0.7);
        doc.chunk.kind = ChunkKind::Documentation;

        let mut q = RetrievalQuery::new("impl struct parser");
        q.max_results = 2;
        q.threshold = Some(0.0);

        let outcome = rerank(vec![doc, code], &[], &q);
        // The code chunk should rank first despite equal raw scores.
        assert_eq!(outcome.results[0].source.origin, "src/a.rs");
    }

    #[test]
    fn test_scores_reported_are_raw() {
        let candidates = vec![candidate("c", "src/a.rs", 0.66)];
        let mut q = query(1);
        q.threshold = Some(0.0);
        let outcome = rerank(candidates, &[], &q);
        assert!((outcome.results[0].score - 0.66).abs() < 1e-6);
    }
}

//! Typed errors for the chunking and embedding seams.
//!
//! Orchestration code uses `anyhow` for propagation; these enums exist where
//! callers need to distinguish failure classes: configuration mistakes that
//! must never be retried, and embedding failures where only rate limits and
//! transport problems are worth retrying.

use thiserror::Error;

/// Errors from the chunking engine.
///
/// Empty documents are not errors (they yield zero chunks); the only fatal
/// condition is a limit configuration that would stall window advancement.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// `overlap_size >= max_chunk_size` would make the character window
    /// never advance. Reported, never clamped.
    #[error("overlap_size ({overlap}) must be smaller than max_chunk_size ({max})")]
    OverlapExceedsWindow { overlap: usize, max: usize },

    /// `max_chunk_size` of zero admits no content at all.
    #[error("max_chunk_size must be > 0")]
    ZeroWindow,
}

/// Errors from an embedding provider.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider rejected the request for rate-limiting reasons (HTTP 429).
    #[error("embedding provider rate limited: {0}")]
    RateLimited(String),

    /// The input itself was rejected (non-429 4xx, empty batch, bad model).
    #[error("embedding request invalid: {0}")]
    InvalidInput(String),

    /// The request never completed (connect failure, timeout, 5xx).
    #[error("embedding transport failure: {0}")]
    Transport(String),

    /// The provider responded but the payload was not usable.
    #[error("embedding provider error: {0}")]
    Provider(String),
}

impl EmbedError {
    /// Whether a retry with backoff can reasonably succeed.
    ///
    /// Mirrors the classification used for HTTP providers: 429 and 5xx or
    /// network errors retry, other client errors fail immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedError::RateLimited(_) | EmbedError::Transport(_))
    }
}

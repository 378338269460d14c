use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_chunk_size: usize,
    #[serde(default)]
    pub overlap_size: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_results")]
    pub min_results: usize,
    #[serde(default = "default_hard_cap")]
    pub hard_cap: usize,
    #[serde(default = "default_diversity_lambda")]
    pub diversity_lambda: f32,
    #[serde(default = "default_max_per_source")]
    pub max_per_source: usize,
    #[serde(default = "default_true")]
    pub dedupe: bool,
    #[serde(default = "default_true")]
    pub adaptive_threshold: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_results: default_min_results(),
            hard_cap: default_hard_cap(),
            diversity_lambda: default_diversity_lambda(),
            max_per_source: default_max_per_source(),
            dedupe: true,
            adaptive_threshold: true,
        }
    }
}

fn default_max_results() -> usize {
    8
}
fn default_min_results() -> usize {
    3
}
fn default_hard_cap() -> usize {
    100
}
fn default_diversity_lambda() -> f32 {
    0.7
}
fn default_max_per_source() -> usize {
    2
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for self-hosted providers (Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetcherConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_max_file_bytes() -> u64 {
    1_048_576
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    256
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if let Some(overlap) = config.chunking.overlap_size {
        if overlap >= config.chunking.max_chunk_size {
            anyhow::bail!(
                "chunking.overlap_size ({}) must be smaller than max_chunk_size ({})",
                overlap,
                config.chunking.max_chunk_size
            );
        }
    }

    // Validate retrieval
    if config.retrieval.max_results < 1 {
        anyhow::bail!("retrieval.max_results must be >= 1");
    }
    if config.retrieval.hard_cap < config.retrieval.max_results {
        anyhow::bail!("retrieval.hard_cap must be >= retrieval.max_results");
    }
    if !(0.0..=1.0).contains(&config.retrieval.diversity_lambda) {
        anyhow::bail!("retrieval.diversity_lambda must be in [0.0, 1.0]");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(config)
}

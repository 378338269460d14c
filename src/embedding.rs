//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two concrete backends:
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API.
//! - **[`OllamaProvider`]** — calls a local Ollama instance's `/api/embed`.
//!
//! Providers perform a single attempt and classify failures as
//! [`EmbedError`] variants so callers can decide what to retry; the
//! retry-with-backoff loop lives in [`crate::retry`], outside the
//! providers. Batch calls preserve input-order-to-output-order
//! correspondence.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// An external embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts. Output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Provider("empty embedding response".to_string()))
    }
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Box::new(OllamaProvider::new(config)?)),
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
}

/// Map an HTTP status to the embedding error taxonomy.
///
/// 429 is rate limiting, other 4xx reject the input, 5xx is a transport
/// class failure worth retrying.
fn classify_status(status: reqwest::StatusCode, body: String) -> EmbedError {
    if status.as_u16() == 429 {
        EmbedError::RateLimited(body)
    } else if status.is_client_error() {
        EmbedError::InvalidInput(format!("{}: {}", status, body))
    } else {
        EmbedError::Transport(format!("{}: {}", status, body))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body_text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbedError::Provider(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Extract the `data[].embedding` arrays in input order.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbedError::Provider("missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbedError::Provider("missing embedding".to_string()))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance
/// (`POST /api/embed`, default `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(format!("{}/api/embed", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EmbedError::Transport(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, body_text));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EmbedError::Provider(e.to_string()))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::Provider("missing embeddings array".to_string()))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| EmbedError::Provider("embedding is not an array".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

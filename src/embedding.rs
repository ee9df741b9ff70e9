//! Embedding client abstraction and implementations.
//!
//! Defines the [`EmbeddingClient`] trait and two HTTP-backed providers:
//! - **[`OpenAiEmbeddingClient`]** — calls an OpenAI-compatible
//!   `/v1/embeddings` endpoint; supports a per-owner API key override.
//! - **[`OllamaEmbeddingClient`]** — calls a local Ollama instance's
//!   `/api/embed` endpoint.
//!
//! Also provides the vector utilities shared with the SQLite store:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].
//!
//! # Retry Strategy
//!
//! Transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! The embedding dimensionality is a fixed constant for the whole system
//! and must match the vector-store schema; a response with a different
//! length is reported as [`DocdexError::Config`], not as a per-call
//! service error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{DocdexError, Result};

/// Trait for embedding providers: text in, fixed-length vector out.
///
/// The optional `owner_api_key` lets a tenant bring their own embedding
/// account; when absent the provider falls back to its configured
/// credentials.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed one text. Fails with [`DocdexError::EmbeddingService`] on
    /// transport or auth failure.
    async fn embed(&self, text: &str, owner_api_key: Option<&str>) -> Result<Vec<f32>>;
}

/// Create the appropriate [`EmbeddingClient`] from configuration.
///
/// The provider set is closed; unknown names are rejected here rather
/// than passed through.
pub fn create_embedding_client(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbeddingClient::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbeddingClient::new(config)?)),
        other => Err(DocdexError::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

fn require_model(config: &EmbeddingConfig) -> Result<String> {
    config
        .model
        .clone()
        .ok_or_else(|| DocdexError::Config("embedding.model required".to_string()))
}

fn require_dims(config: &EmbeddingConfig) -> Result<usize> {
    match config.dims {
        Some(d) if d > 0 => Ok(d),
        _ => Err(DocdexError::Config("embedding.dims required".to_string())),
    }
}

fn check_dims(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(DocdexError::Config(format!(
            "embedding dimension mismatch: expected {}, service returned {}",
            expected,
            vector.len()
        )));
    }
    Ok(())
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

// ============ OpenAI-compatible provider ============

/// Embedding client for the OpenAI embeddings API (or any compatible
/// endpoint via `embedding.url`).
pub struct OpenAiEmbeddingClient {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    http: reqwest::Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config)?;
        let dims = require_dims(config)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocdexError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            model,
            dims,
            url,
            max_retries: config.max_retries,
            http,
        })
    }

    fn resolve_api_key(&self, owner_api_key: Option<&str>) -> Result<String> {
        if let Some(key) = owner_api_key {
            return Ok(key.to_string());
        }
        std::env::var("OPENAI_API_KEY")
            .map_err(|_| DocdexError::EmbeddingService("OPENAI_API_KEY not set".to_string()))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, owner_api_key: Option<&str>) -> Result<Vec<f32>> {
        let api_key = self.resolve_api_key(owner_api_key)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            DocdexError::EmbeddingService(format!("invalid response body: {}", e))
                        })?;
                        let vector = parse_openai_embedding(&json)?;
                        check_dims(self.dims, &vector)?;
                        return Ok(vector);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(DocdexError::EmbeddingService(format!(
                            "embedding API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(DocdexError::EmbeddingService(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(DocdexError::EmbeddingService(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DocdexError::EmbeddingService("embedding failed after retries".to_string())
        }))
    }
}

fn parse_openai_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            DocdexError::EmbeddingService("invalid embedding response: missing data".to_string())
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Ollama provider ============

/// Embedding client for a local Ollama instance. The per-owner API key is
/// ignored: Ollama is unauthenticated.
pub struct OllamaEmbeddingClient {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    http: reqwest::Client,
}

impl OllamaEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = require_model(config)?;
        let dims = require_dims(config)?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocdexError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            model,
            dims,
            url,
            max_retries: config.max_retries,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str, _owner_api_key: Option<&str>) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            DocdexError::EmbeddingService(format!("invalid response body: {}", e))
                        })?;
                        let vector = parse_ollama_embedding(&json)?;
                        check_dims(self.dims, &vector)?;
                        return Ok(vector);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(DocdexError::EmbeddingService(format!(
                            "Ollama API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(DocdexError::EmbeddingService(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(DocdexError::EmbeddingService(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DocdexError::EmbeddingService("Ollama embedding failed after retries".to_string())
        }))
    }
}

fn parse_ollama_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            DocdexError::EmbeddingService(
                "invalid Ollama response: missing embeddings array".to_string(),
            )
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes for SQLite storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]` (equal to `1 − cosine distance`);
/// `0.0` for empty vectors or vectors of different lengths.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_parse_openai_embedding() {
        let json = serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}]
        });
        let vec = parse_openai_embedding(&json).unwrap();
        assert_eq!(vec.len(), 3);
        assert!((vec[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_parse_openai_embedding_missing_data() {
        let json = serde_json::json!({"unexpected": true});
        assert!(parse_openai_embedding(&json).is_err());
    }

    #[test]
    fn test_parse_ollama_embedding() {
        let json = serde_json::json!({"embeddings": [[1.0, 0.5]]});
        let vec = parse_ollama_embedding(&json).unwrap();
        assert_eq!(vec, vec![1.0, 0.5]);
    }

    #[test]
    fn test_dims_mismatch_is_config_error() {
        let err = check_dims(4, &[0.0; 3]).unwrap_err();
        assert!(matches!(err, DocdexError::Config(_)));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "quantum".to_string(),
            model: Some("m".to_string()),
            dims: Some(4),
            ..Default::default()
        };
        assert!(create_embedding_client(&config).is_err());
    }
}

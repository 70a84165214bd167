//! Embedding model abstraction and implementations.
//!
//! [`Embedder`] wraps a provider behind an explicit `load()` step: the
//! model is constructed once, and embedding before `load()` is a
//! [`RagError::EmbedderNotLoaded`]. Two providers:
//!
//! - **ollama** — calls an Ollama-compatible `/api/embed` endpoint with
//!   batching, retry, and exponential backoff.
//! - **hashed** — deterministic token-feature projection; no network,
//!   no model files. The default, and what the test suites use.
//!
//! All providers L2-normalize their output, so the index's inner
//! product is cosine-equivalent.
//!
//! # Retry Strategy (ollama)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;
use crate::error::RagError;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one unit-normalized vector per input,
    /// in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Stateful embedding front-end with load-once semantics.
pub struct Embedder {
    config: EmbeddingConfig,
    provider: Option<Box<dyn EmbeddingProvider>>,
}

impl Embedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    /// Construct the configured provider. Idempotent: subsequent calls
    /// are no-ops.
    pub fn load(&mut self) -> Result<(), RagError> {
        if self.provider.is_some() {
            return Ok(());
        }
        let provider: Box<dyn EmbeddingProvider> = match self.config.provider.as_str() {
            "hashed" => Box::new(HashedProvider::new(self.config.dims)),
            "ollama" => Box::new(OllamaProvider::new(&self.config)?),
            other => {
                return Err(RagError::Provider(format!(
                    "unknown embedding provider: {other}"
                )))
            }
        };
        self.provider = Some(provider);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&dyn EmbeddingProvider, RagError> {
        self.provider.as_deref().ok_or(RagError::EmbedderNotLoaded)
    }

    /// Output dimensionality, fixed once `load()` completes.
    pub fn dims(&self) -> Result<usize, RagError> {
        Ok(self.provider()?.dims())
    }

    pub fn model_name(&self) -> Result<&str, RagError> {
        Ok(self.provider()?.model_name())
    }

    /// Embed a single text (query path).
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Provider("empty embedding response".to_string()))
    }

    /// Embed a batch of texts. Order-preserving and length-preserving.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let provider = self.provider()?;
        let vectors = provider.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::Provider(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

// ============ Hashed Provider ============

/// Deterministic, offline embedding via hashed token features.
///
/// Each whitespace token contributes eight signed one-hot features
/// derived from its SHA-256 digest. Texts sharing tokens land near each
/// other under inner product, which is enough for deterministic tests
/// and air-gapped operation.
pub struct HashedProvider {
    dims: usize,
}

impl HashedProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let digest = Sha256::digest(token.as_bytes());
            for lane in digest.chunks_exact(4) {
                let raw = u32::from_le_bytes([lane[0], lane[1], lane[2], lane[3]]);
                let slot = (raw >> 1) as usize % self.dims;
                let sign = if raw & 1 == 0 { 1.0 } else { -1.0 };
                vector[slot] += sign;
            }
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashedProvider {
    fn model_name(&self) -> &str {
        "hashed"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Ollama Provider ============

/// Embedding provider backed by an Ollama-compatible HTTP endpoint.
///
/// Calls `POST {endpoint}/api/embed` with the configured model and a
/// batch of inputs.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    endpoint: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, RagError> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::Provider("embedding.model required for ollama provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims: config.dims,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client,
        })
    }

    async fn embed_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/api/embed", self.endpoint);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<RagError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.client.post(&url).json(&body).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: EmbedResponse = response.json().await?;
                        let mut vectors = parsed.embeddings;
                        for v in &mut vectors {
                            l2_normalize(v);
                        }
                        return Ok(vectors);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(RagError::Provider(format!(
                            "embedding API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RagError::Provider(format!(
                        "embedding API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(RagError::Http(e));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::Provider("embedding failed after retries".to_string())))
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

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_request(batch).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed_embedder() -> Embedder {
        let mut embedder = Embedder::new(EmbeddingConfig::default());
        embedder.load().unwrap();
        embedder
    }

    #[tokio::test]
    async fn test_embed_before_load_fails() {
        let embedder = Embedder::new(EmbeddingConfig::default());
        assert!(matches!(
            embedder.embed("hello").await,
            Err(RagError::EmbedderNotLoaded)
        ));
        assert!(matches!(embedder.dims(), Err(RagError::EmbedderNotLoaded)));
    }

    #[test]
    fn test_load_idempotent() {
        let mut embedder = Embedder::new(EmbeddingConfig::default());
        embedder.load().unwrap();
        embedder.load().unwrap();
        assert!(embedder.is_loaded());
        assert_eq!(embedder.dims().unwrap(), 384);
    }

    #[tokio::test]
    async fn test_hashed_deterministic() {
        let embedder = hashed_embedder();
        let a = embedder.embed("the quick brown fox").await.unwrap();
        let b = embedder.embed("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hashed_unit_norm() {
        let embedder = hashed_embedder();
        let v = embedder.embed("some document text").await.unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_shared_tokens_score_higher() {
        let embedder = hashed_embedder();
        let query = embedder.embed("rust memory safety").await.unwrap();
        let near = embedder.embed("rust memory model notes").await.unwrap();
        let far = embedder.embed("banana bread recipe").await.unwrap();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&query, &near) > dot(&query, &far));
    }

    #[tokio::test]
    async fn test_embed_batch_order_preserving() {
        let embedder = hashed_embedder();
        let texts = vec![
            "first text".to_string(),
            "second text".to_string(),
            "third text".to_string(),
        ];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(&embedder.embed(text).await.unwrap(), vector);
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let embedder = hashed_embedder();
        let batch = embedder.embed_batch(&[]).await.unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0f32; 8];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
    }
}

//! Sentence-embedding model, used by the rule-based continuation
//! strategy's semantic-similarity signal. External collaborator (spec §1)
//! — this module only defines the interface and an HTTP client for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use threadline_core::error::{Result, ThreadlineError};

/// Given text, returns a fixed-length, L2-normalised embedding. Callers
/// use plain dot-product as cosine similarity (spec §6).
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// HTTP-backed embedder, shared (connection-pooled) and safe to call
/// concurrently per spec §5's "shared resources" requirement. Caches
/// embeddings by exact text match — conversation text is re-embedded
/// every time the rule-based strategy re-scores a live conversation
/// against a new message, so the concatenated-history embedding is
/// recomputed far more than it needs to be without this cache.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    cache: Arc<DashMap<String, Vec<f32>>>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            endpoint: endpoint.into(),
            cache: Arc::new(DashMap::new()),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ThreadlineError::Embedding(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ThreadlineError::Embedding(format!(
                "embedding service returned HTTP {}",
                resp.status()
            )));
        }

        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ThreadlineError::Embedding(e.to_string()))?;

        self.cache
            .insert(text.to_string(), parsed.embedding.clone());
        Ok(parsed.embedding)
    }
}

/// Cosine similarity between two vectors. Returns 0.0 for a zero-norm
/// input rather than dividing by zero (mirrors the reference
/// implementation's `norm1 == 0 || norm2 == 0` guard).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

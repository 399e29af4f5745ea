//! Embedding backend contract and vector math shared by the memory store and
//! the daily-life perceive stage.
//!
//! Every backend must produce 384-dim L2-normalized vectors so that dot
//! product equals cosine similarity everywhere downstream.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Dimensionality every backend must produce.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding backend request failed: {0}")]
    Backend(String),
    #[error("embedding backend timed out")]
    Timeout,
    #[error("backend returned {got}-dim vector, expected {expected}")]
    WrongDimension { got: usize, expected: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.  Output order matches input order; every
    /// vector is [`EMBEDDING_DIM`] wide and L2-normalized.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self.embed(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| EmbeddingError::Backend("empty batch response".to_string()))
    }
}

// ── vector math ───────────────────────────────────────────────────────────────

/// Scale `v` to unit length in place.  Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn is_normalized(v: &[f32], tolerance: f32) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() <= tolerance
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

// ── HTTP backend ──────────────────────────────────────────────────────────────

/// Client for a text-embeddings-inference style HTTP backend
/// (`POST /embed` with `{"inputs": [...]}` returning `[[f32; 384], ...]`).
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Plain(Vec<Vec<f32>>),
    Wrapped { embeddings: Vec<Vec<f32>> },
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/embed", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "inputs": texts,
            "model": self.model_name,
        });

        let response = self
            .client
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::Backend(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbeddingError::Backend(format!("status {status}")));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::Backend(err.to_string()))?;
        let mut vectors = match body {
            EmbedResponse::Plain(v) => v,
            EmbedResponse::Wrapped { embeddings } => embeddings,
        };

        for v in &mut vectors {
            if v.len() != EMBEDDING_DIM {
                return Err(EmbeddingError::WrongDimension {
                    got: v.len(),
                    expected: EMBEDDING_DIM,
                });
            }
            // Re-normalize defensively; downstream assumes dot == cosine.
            l2_normalize(v);
        }

        Ok(vectors)
    }
}

// ── deterministic offline backend ─────────────────────────────────────────────

/// Deterministic token-hash embedder.  Not semantically meaningful, but
/// stable across runs: identical texts map to identical unit vectors and
/// token overlap produces cosine overlap.  Used by tests and offline runs
/// where no embedding service is reachable.
#[derive(Debug, Default, Clone)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn embed_text(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            // Fold the digest into (bucket, sign) pairs.
            for pair in digest.chunks(4) {
                let bucket =
                    u16::from_le_bytes([pair[0], pair[1]]) as usize % EMBEDDING_DIM;
                let sign = if pair[2] & 1 == 0 { 1.0 } else { -1.0 };
                v[bucket] += sign;
            }
        }
        l2_normalize(&mut v);
        if v.iter().all(|x| *x == 0.0) {
            // Empty input still needs a valid unit vector.
            v[0] = 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| Self::embed_text(t)).collect())
    }
}

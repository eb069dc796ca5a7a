//! Embedders.
//!
//! [`TokenHashEmbedder`] is deterministic and offline: tokens are hashed into a
//! fixed number of signed buckets. [`OllamaEmbedder`] calls a local Ollama
//! server (`/api/embed`, falling back to per-item `/api/embeddings` for older
//! versions).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{normalize, Embedder, IndexError};

pub const DEFAULT_TOKEN_HASH_DIM: usize = 256;

// ============================================================================
// Token hash
// ============================================================================

#[derive(Debug, Clone)]
pub struct TokenHashEmbedder {
    dim: usize,
}

impl Default for TokenHashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_HASH_DIM)
    }
}

impl TokenHashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let h = fnv1a64(&token);
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        normalize(&mut v);
        v
    }
}

fn fnv1a64(s: &str) -> u64 {
    let mut h: u64 = 14695981039346656037;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}

/// Lowercased alphanumeric runs.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for TokenHashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn name(&self) -> &str {
        "token-hash"
    }
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaEmbedder {
    client: Client,
    host: String,
    model: String,
    label: String,
}

impl OllamaEmbedder {
    pub fn new(host: &str, model: &str, timeout: Option<Duration>) -> Result<Self, IndexError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| IndexError::Network(format!("failed to build http client: {e}")))?;

        let mut host = host.trim().to_string();
        if host.is_empty() {
            host = "http://127.0.0.1:11434".to_string();
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            host = format!("http://{host}");
        }
        let host = host.trim_end_matches('/').to_string();
        let label = format!("ollama-embed({model})");

        Ok(Self {
            client,
            host,
            model: model.to_string(),
            label,
        })
    }

    async fn embed_per_item(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        #[derive(Deserialize)]
        struct EmbeddingsResp {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.host);
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            let body = serde_json::json!({ "model": self.model, "prompt": t });
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| IndexError::Network(format!("failed to reach ollama at {url}: {e}")))?;
            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(IndexError::Embedding(format!("ollama http error {status}: {text}")));
            }
            let r: EmbeddingsResp = resp.json().await.map_err(|e| {
                IndexError::Embedding(format!("ollama /api/embeddings returned invalid JSON: {e}"))
            })?;
            out.push(r.embedding);
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct EmbedResp {
            embeddings: Vec<Vec<f32>>,
        }

        let url = format!("{}/api/embed", self.host);
        let body = serde_json::json!({ "model": self.model, "input": texts, "truncate": true });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::Network(format!("failed to reach ollama at {url}: {e}")))?;

        if !resp.status().is_success() {
            tracing::debug!(status = %resp.status(), "ollama /api/embed unavailable, using /api/embeddings");
            return self.embed_per_item(texts).await;
        }

        let out: EmbedResp = resp.json().await.map_err(|e| {
            IndexError::Embedding(format!("ollama /api/embed returned invalid JSON: {e}"))
        })?;
        if out.embeddings.len() != texts.len() {
            return Err(IndexError::CountMismatch {
                expected: texts.len(),
                got: out.embeddings.len(),
            });
        }
        Ok(out.embeddings)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot;
    use approx::assert_relative_eq;

    #[test]
    fn test_token_hash_is_deterministic_and_unit_length() {
        let e = TokenHashEmbedder::default();
        let a = e.embed_one("Warm surface water in the Indian Ocean");
        let b = e.embed_one("warm SURFACE water, in the indian ocean!");
        assert_eq!(a, b);
        assert_relative_eq!(dot(&a, &a), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_similar_texts_score_higher() {
        let e = TokenHashEmbedder::default();
        let q = e.embed_one("hot salty indian ocean surface");
        let near = e.embed_one("indian ocean surface profile hot");
        let far = e.embed_one("arctic deep cold fresh");
        assert!(dot(&q, &near) > dot(&q, &far));
    }

    #[test]
    fn test_tokenize() {
        let toks: Vec<String> = tokenize("{\"id\":12,\"time\":\"2022-08-15\"}").collect();
        assert_eq!(toks, vec!["id", "12", "time", "2022", "08", "15"]);
    }

    #[test]
    fn test_ollama_host_normalized() {
        let e = OllamaEmbedder::new("localhost:11434/", "all-minilm", None).unwrap();
        assert_eq!(e.host, "http://localhost:11434");
        assert_eq!(e.name(), "ollama-embed(all-minilm)");
    }
}

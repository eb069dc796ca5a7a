//! FloatChat similarity index.
//!
//! Holds the reference documents written by the ingestion pipeline (one short
//! description per indexed profile) and answers two questions:
//!
//! - [`SimilarityIndex::embed_and_search`]: which of these candidate documents
//!   sit closest to the indexed corpus?
//! - [`SimilarityIndex::rank_by_query`]: which candidates sit closest to a
//!   free-text query?
//!
//! Both return positions into the caller's batch, best first.

pub mod corpus;
pub mod embed;
pub mod index;

use async_trait::async_trait;

pub use corpus::{load_corpus, CorpusDocument};
pub use embed::{OllamaEmbedder, TokenHashEmbedder};
pub use index::CorpusIndex;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },
    #[error("invalid corpus: {0}")]
    InvalidCorpus(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("index task failed: {0}")]
    Task(String),
}

/// Turns texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;

    fn name(&self) -> &str;
}

/// Similarity search over a previously indexed corpus.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Positions into `documents`, ordered by similarity to the indexed
    /// corpus, at most `k` of them.
    async fn embed_and_search(
        &self,
        documents: &[String],
        k: usize,
    ) -> Result<Vec<usize>, IndexError>;

    /// Positions into `documents`, ordered by similarity to `query`, at most
    /// `k` of them.
    async fn rank_by_query(
        &self,
        query: &str,
        documents: &[String],
        k: usize,
    ) -> Result<Vec<usize>, IndexError>;

    fn describe(&self) -> String;
}

/// Scale to unit length in place. Zero vectors stay zero.
pub fn normalize(v: &mut [f32]) {
    let norm2: f32 = v.iter().map(|x| x * x).sum();
    if norm2 > 0.0 {
        let inv = 1.0 / norm2.sqrt();
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sort `(position, score)` pairs best first (ties by position) and keep `k`.
pub(crate) fn top_positions(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<usize> {
    scored.sort_by(|(pa, sa), (pb, sb)| sb.total_cmp(sa).then_with(|| pa.cmp(pb)));
    scored.into_iter().take(k).map(|(p, _)| p).collect()
}

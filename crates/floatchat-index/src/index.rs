//! HNSW-backed corpus index.
//!
//! The corpus is embedded once at build time. Vectors are unit-normalized, so
//! L2 distance in the graph orders neighbours the same way cosine similarity
//! does; reported scores are recomputed as exact dot products.

use std::sync::Arc;

use async_trait::async_trait;
use hnsw_rs::prelude::{DistL2, Hnsw};

use crate::{dot, normalize, top_positions, CorpusDocument, Embedder, IndexError, SimilarityIndex};

/// Neighbours inspected per candidate; the best one sets the score.
const NEIGHBOURS: usize = 4;
const EF_SEARCH: usize = 64;

struct CorpusGraph {
    vectors: Vec<Vec<f32>>,
    hnsw: Hnsw<'static, f32, DistL2>,
}

impl CorpusGraph {
    fn build(vectors: Vec<Vec<f32>>) -> Self {
        // Conservative defaults: `m` max connections per layer,
        // `ef_construction` construction search width.
        let m: usize = 16;
        let ef_construction: usize = 200;
        let nb_elem = vectors.len();
        let max_layer = 16.min((nb_elem as f32).ln().trunc() as usize).max(1);

        let hnsw = Hnsw::<f32, DistL2>::new(m, nb_elem, max_layer, ef_construction, DistL2 {});
        for (i, v) in vectors.iter().enumerate() {
            hnsw.insert((&v[..], i));
        }
        Self { vectors, hnsw }
    }

    /// Best cosine similarity between `v` and any corpus vector.
    fn best_similarity(&self, v: &[f32]) -> f32 {
        let k = NEIGHBOURS.min(self.vectors.len()).max(1);
        self.hnsw
            .search(v, k, EF_SEARCH)
            .into_iter()
            .filter_map(|n| self.vectors.get(n.d_id))
            .map(|c| dot(v, c))
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

pub struct CorpusIndex {
    embedder: Arc<dyn Embedder>,
    documents: Vec<CorpusDocument>,
    dim: Option<usize>,
    graph: Option<Arc<CorpusGraph>>,
}

impl CorpusIndex {
    /// Embed `documents` and build the graph. An empty corpus is allowed:
    /// searches then keep the caller's order.
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        documents: Vec<CorpusDocument>,
    ) -> Result<Self, IndexError> {
        if documents.is_empty() {
            tracing::warn!("similarity corpus is empty; reranking keeps store order");
            return Ok(Self {
                embedder,
                documents,
                dim: None,
                graph: None,
            });
        }

        let texts: Vec<String> = documents.iter().map(|d| d.document.clone()).collect();
        let vectors = embed_normalized(embedder.as_ref(), &texts, None).await?;
        let dim = vectors.first().map(Vec::len);

        let graph = tokio::task::spawn_blocking(move || CorpusGraph::build(vectors))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?;

        tracing::info!(
            documents = documents.len(),
            embedder = embedder.name(),
            "built similarity index"
        );
        Ok(Self {
            embedder,
            documents,
            dim,
            graph: Some(Arc::new(graph)),
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[CorpusDocument] {
        &self.documents
    }

    /// `(position, best corpus similarity)` for every input document.
    pub async fn score_against_corpus(
        &self,
        documents: &[String],
    ) -> Result<Vec<(usize, f32)>, IndexError> {
        let Some(graph) = self.graph.clone() else {
            return Ok((0..documents.len()).map(|i| (i, 0.0)).collect());
        };
        let vectors = embed_normalized(self.embedder.as_ref(), documents, self.dim).await?;

        // Graph search takes `&self`; concurrent reranks share it unlocked.
        tokio::task::spawn_blocking(move || {
            vectors
                .iter()
                .enumerate()
                .map(|(i, v)| (i, graph.best_similarity(v)))
                .collect()
        })
        .await
        .map_err(|e| IndexError::Task(e.to_string()))
    }
}

/// Embed, check shape, and unit-normalize.
async fn embed_normalized(
    embedder: &dyn Embedder,
    texts: &[String],
    expected_dim: Option<usize>,
) -> Result<Vec<Vec<f32>>, IndexError> {
    let mut vectors = embedder.embed(texts).await?;
    if vectors.len() != texts.len() {
        return Err(IndexError::CountMismatch {
            expected: texts.len(),
            got: vectors.len(),
        });
    }
    let expected = expected_dim.or_else(|| vectors.first().map(Vec::len));
    for v in vectors.iter_mut() {
        if let Some(expected) = expected {
            if v.len() != expected {
                return Err(IndexError::Dimension {
                    expected,
                    got: v.len(),
                });
            }
        }
        normalize(v);
    }
    Ok(vectors)
}

#[async_trait]
impl SimilarityIndex for CorpusIndex {
    async fn embed_and_search(
        &self,
        documents: &[String],
        k: usize,
    ) -> Result<Vec<usize>, IndexError> {
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let scored = self.score_against_corpus(documents).await?;
        Ok(top_positions(scored, k))
    }

    async fn rank_by_query(
        &self,
        query: &str,
        documents: &[String],
        k: usize,
    ) -> Result<Vec<usize>, IndexError> {
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut batch = Vec::with_capacity(documents.len() + 1);
        batch.push(query.to_string());
        batch.extend_from_slice(documents);

        let vectors = embed_normalized(self.embedder.as_ref(), &batch, None).await?;
        let (q, docs) = vectors.split_at(1);
        let scored = docs
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&q[0], v)))
            .collect();
        Ok(top_positions(scored, k))
    }

    fn describe(&self) -> String {
        format!(
            "corpus({} documents, {})",
            self.documents.len(),
            self.embedder.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenHashEmbedder;

    fn corpus() -> Vec<CorpusDocument> {
        vec![
            CorpusDocument::new("a", "hot indian ocean surface profile high salinity"),
            CorpusDocument::new("b", "cold arctic deep profile low salinity"),
        ]
    }

    async fn index() -> CorpusIndex {
        CorpusIndex::build(Arc::new(TokenHashEmbedder::default()), corpus())
            .await
            .unwrap()
    }

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_embed_and_search_prefers_corpus_like_documents() {
        let index = index().await;
        let batch = docs(&[
            "unrelated words entirely",
            "hot indian ocean surface profile",
            "cold arctic deep profile",
        ]);
        let positions = index.embed_and_search(&batch, 2).await.unwrap();
        assert_eq!(positions.len(), 2);
        assert!(!positions.contains(&0));
    }

    #[tokio::test]
    async fn test_k_truncates_and_positions_are_unique() {
        let index = index().await;
        let batch = docs(&["a", "b", "c", "d", "e", "f", "g"]);
        let positions = index.embed_and_search(&batch, 5).await.unwrap();
        assert_eq!(positions.len(), 5);
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 5);
        assert!(positions.iter().all(|&p| p < batch.len()));
    }

    #[tokio::test]
    async fn test_empty_corpus_keeps_input_order() {
        let index = CorpusIndex::build(Arc::new(TokenHashEmbedder::default()), Vec::new())
            .await
            .unwrap();
        let positions = index
            .embed_and_search(&docs(&["x", "y", "z"]), 2)
            .await
            .unwrap();
        assert_eq!(positions, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_rank_by_query() {
        let index = index().await;
        let batch = docs(&["arctic cold deep", "indian ocean hot surface"]);
        let positions = index
            .rank_by_query("hot surface water in the indian ocean", &batch, 5)
            .await
            .unwrap();
        assert_eq!(positions, vec![1, 0]);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let index = index().await;
        assert!(index.embed_and_search(&[], 5).await.unwrap().is_empty());
        assert!(index.rank_by_query("q", &[], 5).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_scoring_shares_the_graph() {
        let index = Arc::new(index().await);
        let batch = docs(&["hot indian ocean surface", "cold arctic deep", "noise"]);
        let expected = index.score_against_corpus(&batch).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let index = index.clone();
                let batch = batch.clone();
                tokio::spawn(async move { index.score_against_corpus(&batch).await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), expected);
        }
    }
}

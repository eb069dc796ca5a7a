//! Similarity reranking of the pipeline's survivors.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use floatchat_index::SimilarityIndex;
use floatchat_store::{Record, ResultSet};
use serde::{Deserialize, Serialize};

use crate::error::{bounded, QueryError, Stage};

pub const DEFAULT_RERANK_LIMIT: usize = 5;

/// What candidates are compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankAnchor {
    /// Best similarity to any previously indexed reference document.
    #[default]
    Corpus,
    /// Similarity to the user's prompt.
    Prompt,
}

impl FromStr for RerankAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "corpus" => Ok(RerankAnchor::Corpus),
            "prompt" => Ok(RerankAnchor::Prompt),
            other => Err(format!("unknown rerank anchor `{other}` (expected corpus|prompt)")),
        }
    }
}

pub struct Reranker {
    index: Arc<dyn SimilarityIndex>,
    limit: usize,
    anchor: RerankAnchor,
    timeout: Option<Duration>,
}

impl Reranker {
    pub fn new(index: Arc<dyn SimilarityIndex>) -> Self {
        Self {
            index,
            limit: DEFAULT_RERANK_LIMIT,
            anchor: RerankAnchor::default(),
            timeout: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_anchor(mut self, anchor: RerankAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// At most `limit` records from `results`, best first.
    ///
    /// Each record is sent in its canonical text form. Positions the index
    /// returns out of range, or more than once, are skipped.
    pub async fn rerank(&self, prompt: &str, results: ResultSet) -> Result<Vec<Record>, QueryError> {
        if results.is_empty() {
            return Ok(Vec::new());
        }
        let documents: Vec<String> = results.iter().map(Record::canonical_text).collect();

        let positions = match self.anchor {
            RerankAnchor::Corpus => {
                bounded(
                    Stage::Rerank,
                    self.timeout,
                    self.index.embed_and_search(&documents, self.limit),
                )
                .await?
            }
            RerankAnchor::Prompt => {
                bounded(
                    Stage::Rerank,
                    self.timeout,
                    self.index.rank_by_query(prompt, &documents, self.limit),
                )
                .await?
            }
        };

        let candidates = results.len();
        let mut slots: Vec<Option<Record>> = results.into_iter().map(Some).collect();
        let mut ranked = Vec::with_capacity(self.limit.min(candidates));
        for pos in positions {
            if ranked.len() == self.limit {
                break;
            }
            match slots.get_mut(pos) {
                Some(slot) => match slot.take() {
                    Some(record) => ranked.push(record),
                    None => tracing::warn!(position = pos, "index returned a position twice"),
                },
                None => tracing::warn!(
                    position = pos,
                    candidates,
                    "index returned an out-of-range position"
                ),
            }
        }

        tracing::debug!(
            candidates,
            kept = ranked.len(),
            anchor = ?self.anchor,
            index = %self.index.describe(),
            "reranked results"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use floatchat_index::IndexError;

    /// Returns a fixed list of positions regardless of input.
    struct FixedIndex(Vec<usize>);

    #[async_trait]
    impl SimilarityIndex for FixedIndex {
        async fn embed_and_search(&self, _: &[String], _: usize) -> Result<Vec<usize>, IndexError> {
            Ok(self.0.clone())
        }

        async fn rank_by_query(&self, _: &str, documents: &[String], _: usize) -> Result<Vec<usize>, IndexError> {
            Ok((0..documents.len()).rev().collect())
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }
    }

    fn rows(n: i64) -> ResultSet {
        let day = NaiveDate::from_ymd_opt(2022, 8, 15).unwrap();
        (1..=n).map(|id| Record::new(id, day, 0.0, 0.0)).collect()
    }

    fn ids(rs: &[Record]) -> Vec<i64> {
        rs.iter().map(|r| r.id).collect()
    }

    #[tokio::test]
    async fn test_maps_positions_back_to_records() {
        let reranker = Reranker::new(Arc::new(FixedIndex(vec![2, 0, 1])));
        let ranked = reranker.rerank("q", rows(3)).await.unwrap();
        assert_eq!(ids(&ranked), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_skips_duplicates_and_out_of_range() {
        let reranker = Reranker::new(Arc::new(FixedIndex(vec![1, 1, 9, 0])));
        let ranked = reranker.rerank("q", rows(3)).await.unwrap();
        assert_eq!(ids(&ranked), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_truncates_to_limit() {
        let reranker = Reranker::new(Arc::new(FixedIndex((0..10).collect()))).with_limit(4);
        let ranked = reranker.rerank("q", rows(10)).await.unwrap();
        assert_eq!(ids(&ranked), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_prompt_anchor_uses_query_ranking() {
        let reranker = Reranker::new(Arc::new(FixedIndex(vec![])))
            .with_anchor(RerankAnchor::Prompt);
        let ranked = reranker.rerank("q", rows(3)).await.unwrap();
        assert_eq!(ids(&ranked), vec![3, 2, 1]);
    }

    #[test]
    fn test_anchor_parse() {
        assert_eq!("Prompt".parse::<RerankAnchor>(), Ok(RerankAnchor::Prompt));
        assert!("nearest".parse::<RerankAnchor>().is_err());
    }
}

//! End-to-end orchestration.
//!
//! ```text
//!   prompt ─► LanguageModel (plan) ─► parse_plan ─► Pipeline ─► Reranker ─► Summarizer
//!                                         │             │
//!                                         ▼             ▼
//!                                    PlanError        NoData
//! ```
//!
//! Adapters are injected at construction; the engine holds no per-request
//! state, so one instance serves concurrent requests.

use std::sync::Arc;
use std::time::Duration;

use floatchat_index::SimilarityIndex;
use floatchat_llm::LanguageModel;
use floatchat_store::StructuredStore;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{bounded, QueryError, Stage, StagedLlmError};
use crate::pipeline::{Execution, Pipeline};
use crate::plan::{parse_plan_report, Plan, PlanParseError};
use crate::prompts;
use crate::rerank::{RerankAnchor, Reranker, DEFAULT_RERANK_LIMIT};
use crate::summarize::Summarizer;

pub const NO_DATA_MESSAGE: &str = "No data found after applying filters.";
pub const PLAN_ERROR_PREFIX: &str = "Failed to parse function calls: ";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub rerank_limit: usize,
    pub rerank_anchor: RerankAnchor,
    /// Upper bound on each adapter call; `None` waits indefinitely.
    pub adapter_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rerank_limit: DEFAULT_RERANK_LIMIT,
            rerank_anchor: RerankAnchor::Corpus,
            adapter_timeout: None,
        }
    }
}

/// What a request produced when every adapter answered.
///
/// Serializes to exactly one of `{"answer": ..}`, `{"message": ..}` or
/// `{"error": ..}`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Answer(String),
    NoData,
    PlanError(String),
}

impl QueryOutcome {
    pub fn plan_error(err: &PlanParseError) -> Self {
        QueryOutcome::PlanError(format!("{PLAN_ERROR_PREFIX}{err}"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryOutcome::PlanError(_))
    }
}

impl Serialize for QueryOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            QueryOutcome::Answer(text) => map.serialize_entry("answer", text)?,
            QueryOutcome::NoData => map.serialize_entry("message", NO_DATA_MESSAGE)?,
            QueryOutcome::PlanError(text) => map.serialize_entry("error", text)?,
        }
        map.end()
    }
}

/// `{"error": ..}` body for an adapter failure.
pub fn error_body(err: &QueryError) -> serde_json::Value {
    serde_json::json!({ "error": err.to_string() })
}

/// Request envelope accepted by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl QueryRequest {
    pub fn new(user_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            location: None,
        }
    }

    /// The prompt with the caller's location appended, when given.
    pub fn prompt(&self) -> String {
        match self.location.as_deref().map(str::trim) {
            Some(loc) if !loc.is_empty() => {
                format!("{} The location provided is {loc}.", self.user_prompt)
            }
            _ => self.user_prompt.clone(),
        }
    }
}

pub struct QueryEngine {
    llm: Arc<dyn LanguageModel>,
    pipeline: Pipeline,
    reranker: Reranker,
    summarizer: Summarizer,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn StructuredStore>,
        index: Arc<dyn SimilarityIndex>,
        llm: Arc<dyn LanguageModel>,
        config: EngineConfig,
    ) -> Self {
        let timeout = config.adapter_timeout;
        Self {
            pipeline: Pipeline::new(store).with_timeout(timeout),
            reranker: Reranker::new(index)
                .with_limit(config.rerank_limit)
                .with_anchor(config.rerank_anchor)
                .with_timeout(timeout),
            summarizer: Summarizer::new(llm.clone()).with_timeout(timeout),
            llm,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ask the model for a plan and parse it.
    pub async fn plan(&self, prompt: &str) -> Result<Result<Plan, PlanParseError>, QueryError> {
        let call = async {
            self.llm
                .complete(prompts::PLANNING_INSTRUCTION, prompt)
                .await
                .map_err(|e| StagedLlmError(Stage::Plan, e))
        };
        let raw = bounded(Stage::Plan, self.config.adapter_timeout, call).await?;
        tracing::debug!(raw = %raw, "model generated plan");

        Ok(parse_plan_report(&raw).map(|report| {
            if !report.dropped.is_empty() {
                tracing::info!(dropped = ?report.dropped, "dropped unsupported plan entries");
            }
            report.plan
        }))
    }

    /// Plan, execute, rerank, summarize.
    pub async fn answer_query(&self, prompt: &str) -> Result<QueryOutcome, QueryError> {
        let plan = match self.plan(prompt).await? {
            Ok(plan) => plan,
            Err(err) => {
                tracing::warn!(error = %err, "could not parse plan");
                return Ok(QueryOutcome::plan_error(&err));
            }
        };
        tracing::info!(steps = plan.len(), "executing plan");

        let rows = match self.pipeline.execute(&plan).await? {
            Execution::Rows(rows) => rows,
            Execution::NoData { halted_at } => {
                tracing::info!(?halted_at, "no data after filters");
                return Ok(QueryOutcome::NoData);
            }
        };

        let ranked = self.reranker.rerank(prompt, rows).await?;
        let answer = self.summarizer.summarize(prompt, &ranked).await?;
        Ok(QueryOutcome::Answer(answer))
    }

    pub async fn answer_request(&self, request: &QueryRequest) -> Result<QueryOutcome, QueryError> {
        self.answer_query(&request.prompt()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_shapes() {
        assert_eq!(
            serde_json::to_value(QueryOutcome::Answer("hi".into())).unwrap(),
            json!({"answer": "hi"})
        );
        assert_eq!(
            serde_json::to_value(QueryOutcome::NoData).unwrap(),
            json!({"message": "No data found after applying filters."})
        );
        assert_eq!(
            serde_json::to_value(QueryOutcome::plan_error(&PlanParseError::NoJson)).unwrap(),
            json!({"error": "Failed to parse function calls: no JSON list or object found in the text"})
        );
    }

    #[test]
    fn test_location_is_appended() {
        let mut req = QueryRequest::new("Warmest water?");
        assert_eq!(req.prompt(), "Warmest water?");
        req.location = Some("Chennai".into());
        assert_eq!(req.prompt(), "Warmest water? The location provided is Chennai.");
        req.location = Some("  ".into());
        assert_eq!(req.prompt(), "Warmest water?");
    }

    #[test]
    fn test_request_deserializes_without_location() {
        let req: QueryRequest = serde_json::from_str(r#"{"user_prompt":"q"}"#).unwrap();
        assert_eq!(req, QueryRequest::new("q"));
    }
}

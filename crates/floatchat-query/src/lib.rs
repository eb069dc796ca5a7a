//! FloatChat query engine.
//!
//! Turns a natural-language question about Argo float data into an answer:
//!
//! 1. the language model writes a plan (a JSON list of calls),
//! 2. [`plan::parse_plan`] recovers and sanitizes it into typed [`Operation`]s,
//! 3. [`Pipeline`] seeds from the structured store and narrows in memory,
//! 4. [`Reranker`] orders the survivors through the similarity index,
//! 5. [`Summarizer`] asks the model to describe the top records.
//!
//! [`QueryEngine::answer_query`] wires the stages together and yields exactly
//! one of an answer, a no-data message, or a plan error.

pub mod engine;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod plan;
pub mod prompts;
pub mod rerank;
pub mod summarize;

pub use engine::{error_body, EngineConfig, QueryEngine, QueryOutcome, QueryRequest, NO_DATA_MESSAGE};
pub use error::{QueryError, Stage};
pub use pipeline::{Execution, Pipeline};
pub use plan::{parse_plan, Operation, OperationKind, Plan, PlanParseError, PlanReport};
pub use rerank::{RerankAnchor, Reranker, DEFAULT_RERANK_LIMIT};
pub use summarize::{format_evidence, Summarizer};

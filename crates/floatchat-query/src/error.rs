use std::fmt;
use std::future::Future;
use std::time::Duration;

use floatchat_index::IndexError;
use floatchat_llm::LlmError;
use floatchat_store::StoreError;

/// Which adapter call was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Plan,
    Store,
    Rerank,
    Summarize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Plan => "planning",
            Stage::Store => "store query",
            Stage::Rerank => "reranking",
            Stage::Summarize => "summarization",
        })
    }
}

/// Adapter failures. Plan problems and empty results are outcomes, not
/// errors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("structured store failed: {0}")]
    Store(#[from] StoreError),
    #[error("similarity index failed: {0}")]
    Index(#[from] IndexError),
    #[error("language model failed during {stage}: {source}")]
    Llm {
        stage: Stage,
        #[source]
        source: LlmError,
    },
    #[error("{stage} timed out after {}s", .after.as_secs_f64())]
    Timeout { stage: Stage, after: Duration },
}

impl QueryError {
    pub fn stage(&self) -> Stage {
        match self {
            QueryError::Store(_) => Stage::Store,
            QueryError::Index(_) => Stage::Rerank,
            QueryError::Llm { stage, .. } | QueryError::Timeout { stage, .. } => *stage,
        }
    }
}

/// Run one adapter call, optionally bounded by `timeout`. On expiry the call
/// future is dropped, which cancels any in-flight request.
pub(crate) async fn bounded<T, E, F>(
    stage: Stage,
    timeout: Option<Duration>,
    call: F,
) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<QueryError>,
{
    let result = match timeout {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .map_err(|_| QueryError::Timeout { stage, after })?,
        None => call.await,
    };
    result.map_err(Into::into)
}

/// Tags a language-model failure with the stage that issued it.
pub(crate) struct StagedLlmError(pub Stage, pub LlmError);

impl From<StagedLlmError> for QueryError {
    fn from(StagedLlmError(stage, source): StagedLlmError) -> Self {
        QueryError::Llm { stage, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(1)
        };
        let err = bounded(Stage::Store, Some(Duration::from_millis(10)), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Timeout { stage: Stage::Store, .. }));
        assert_eq!(err.stage(), Stage::Store);
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let ok = async { Ok::<_, StoreError>(7) };
        assert_eq!(bounded(Stage::Store, None, ok).await.unwrap(), 7);

        let failing = async { Err::<i32, _>(StoreError::InvalidData("bad".into())) };
        let err = bounded(Stage::Store, None, failing).await.unwrap_err();
        assert_eq!(err.to_string(), "structured store failed: invalid record data: bad");
    }
}

//! FloatChat language-model adapters.
//!
//! The query engine talks to a model through one narrow seam:
//! [`LanguageModel::complete`] takes a system instruction and a user message
//! and returns free-form text. It is called twice per request (planning, then
//! summarization) and never streams.
//!
//! Concrete clients:
//! - [`OllamaClient`]: local models via `/api/chat` (the default deployment)
//! - [`OpenAiClient`]: OpenAI-compatible `/chat/completions`
//! - [`AnthropicClient`]: `/v1/messages`
//! - [`ScriptedModel`]: canned replies for tests and offline demos

pub mod config;
pub mod mock;
pub mod providers;

use std::sync::Arc;

use async_trait::async_trait;

pub use config::{ConfigError, LlmConfig, Provider};
pub use mock::ScriptedModel;
pub use providers::{AnthropicClient, OllamaClient, OpenAiClient};

/// Interface for language-model providers.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One request/response exchange.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    /// Provider and model, for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Build the client selected by `config`.
pub fn client_from_config(config: LlmConfig) -> Result<Arc<dyn LanguageModel>, LlmError> {
    let client: Arc<dyn LanguageModel> = match config.provider {
        Provider::Ollama => Arc::new(OllamaClient::new(config)?),
        Provider::OpenAI => Arc::new(OpenAiClient::new(config)?),
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)?),
        Provider::Mock => Arc::new(ScriptedModel::from_config(&config)),
    };
    tracing::info!(model = %client.describe(), "language model ready");
    Ok(client)
}

//! LLM API Providers
//!
//! Concrete clients for Ollama, OpenAI-compatible servers, and Anthropic.
//! Each owns a `reqwest::Client` built with the configured timeout, so a
//! stalled provider surfaces as a network error instead of hanging the
//! request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::{
    normalize_base_url, LlmConfig, DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_OLLAMA_HOST,
    DEFAULT_OPENAI_BASE_URL,
};
use crate::{LanguageModel, LlmError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 2048;

fn build_http_client(config: &LlmConfig) -> Result<Client, LlmError> {
    let mut builder = Client::builder();
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    builder
        .build()
        .map_err(|e| LlmError::Network(format!("failed to build http client: {e}")))
}

/// Map non-success statuses onto [`LlmError`].
async fn check_status(response: Response, provider: &str) -> Result<Response, LlmError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(LlmError::RateLimited {
            retry_after_ms: retry_after * 1000,
        });
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(LlmError::Api(format!("{provider} http error {status}: {text}")));
    }
    Ok(response)
}

// ============================================================================
// Ollama
// ============================================================================

pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(&config)?,
            host: normalize_base_url(config.base_url.as_deref(), DEFAULT_OLLAMA_HOST),
            model: config.model,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.host);
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "options": { "temperature": 0 }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                LlmError::Network(format!(
                    "failed to reach ollama at {url} (is it running?): {e}"
                ))
            })?;
        let response = check_status(response, "ollama").await?;

        #[derive(Deserialize)]
        struct ChatResponse {
            message: ChatMessage,
        }

        #[derive(Deserialize)]
        struct ChatMessage {
            content: String,
        }

        let out: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("ollama returned invalid JSON: {e}")))?;
        Ok(out.message.content)
    }

    fn describe(&self) -> String {
        format!("ollama({}, {})", self.host, self.model)
    }
}

// ============================================================================
// OpenAI-compatible
// ============================================================================

pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(&config)?,
            base_url: normalize_base_url(config.base_url.as_deref(), DEFAULT_OPENAI_BASE_URL),
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = check_status(response, "openai").await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".into()))
    }

    fn describe(&self) -> String {
        format!("openai({})", self.model)
    }
}

// ============================================================================
// Anthropic
// ============================================================================

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client(&config)?,
            base_url: normalize_base_url(config.base_url.as_deref(), DEFAULT_ANTHROPIC_BASE_URL),
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": self.model,
            "system": system,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "temperature": 0,
            "messages": [{ "role": "user", "content": user }],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = check_status(response, "anthropic").await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text: String = data["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("missing content[].text".into()));
        }
        Ok(text)
    }

    fn describe(&self) -> String {
        format!("anthropic({})", self.model)
    }
}

//! Provider selection from the environment.

use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral:7b";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAI,
    Anthropic,
    Mock,
}

impl Provider {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            other => Err(ConfigError::Invalid(format!(
                "unknown provider `{other}` (expected ollama|openai|anthropic|mock)"
            ))),
        }
    }
}

/// LLM configuration loaded from environment or built directly.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    /// Replies replayed by the mock provider, in order.
    pub canned_replies: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required for provider {1:?}")]
    MissingKey(&'static str, Provider),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl LlmConfig {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup (environment, settings map, tests).
    ///
    /// `FLOATCHAT_LLM_PROVIDER` wins when set; otherwise an OpenAI or
    /// Anthropic key selects that provider, and anything else falls back to
    /// a local Ollama.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match get("FLOATCHAT_LLM_PROVIDER") {
            Some(p) => Provider::parse(&p)?,
            None if get("OPENAI_API_KEY").is_some() => Provider::OpenAI,
            None if get("ANTHROPIC_API_KEY").is_some() => Provider::Anthropic,
            None => Provider::Ollama,
        };

        let timeout_secs = match get("FLOATCHAT_LLM_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "FLOATCHAT_LLM_TIMEOUT_SECS must be a non-negative integer (got `{raw}`)"
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let model_override = get("FLOATCHAT_LLM_MODEL");

        let mut config = match provider {
            Provider::Ollama => Self::ollama(
                &get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
                model_override.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL),
            ),
            Provider::OpenAI => {
                let key = get("OPENAI_API_KEY")
                    .ok_or(ConfigError::MissingKey("OPENAI_API_KEY", Provider::OpenAI))?;
                let mut c = Self::openai(
                    &key,
                    model_override.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL),
                );
                c.base_url = get("OPENAI_BASE_URL");
                c
            }
            Provider::Anthropic => {
                let key = get("ANTHROPIC_API_KEY").ok_or(ConfigError::MissingKey(
                    "ANTHROPIC_API_KEY",
                    Provider::Anthropic,
                ))?;
                let mut c = Self::anthropic(
                    &key,
                    model_override.as_deref().unwrap_or(DEFAULT_ANTHROPIC_MODEL),
                );
                c.base_url = get("ANTHROPIC_BASE_URL");
                c
            }
            Provider::Mock => {
                let replies: Vec<String> = ["FLOATCHAT_MOCK_PLAN", "FLOATCHAT_MOCK_ANSWER"]
                    .iter()
                    .filter_map(|&k| get(k))
                    .collect();
                let mut c = Self::mock("[]");
                if !replies.is_empty() {
                    c.canned_replies = replies;
                }
                c
            }
        };
        config.timeout_secs = timeout_secs;
        Ok(config)
    }

    pub fn ollama(host: &str, model: &str) -> Self {
        Self {
            provider: Provider::Ollama,
            api_key: String::new(),
            model: model.to_string(),
            base_url: Some(host.to_string()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            canned_replies: Vec::new(),
        }
    }

    pub fn openai(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::OpenAI,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: 60,
            canned_replies: Vec::new(),
        }
    }

    pub fn anthropic(api_key: &str, model: &str) -> Self {
        Self {
            provider: Provider::Anthropic,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: None,
            timeout_secs: 60,
            canned_replies: Vec::new(),
        }
    }

    pub fn mock(reply: &str) -> Self {
        Self {
            provider: Provider::Mock,
            api_key: String::new(),
            model: "scripted".to_string(),
            base_url: None,
            timeout_secs: 0,
            canned_replies: vec![reply.to_string()],
        }
    }
}

/// Add a scheme when missing and drop trailing slashes.
pub(crate) fn normalize_base_url(raw: Option<&str>, default: &str) -> String {
    let mut url = raw.map(str::trim).unwrap_or_default().to_string();
    if url.is_empty() {
        url = default.to_string();
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{url}");
    }
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_to_local_ollama() {
        let config = LlmConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.model, DEFAULT_OLLAMA_MODEL);
        assert_eq!(config.base_url.as_deref(), Some(DEFAULT_OLLAMA_HOST));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_openai_key_selects_openai() {
        let config = LlmConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("FLOATCHAT_LLM_MODEL", "gpt-4o"),
        ]))
        .unwrap();
        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_explicit_provider_requires_key() {
        let err = LlmConfig::from_lookup(lookup(&[("FLOATCHAT_LLM_PROVIDER", "anthropic")]))
            .unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let err = LlmConfig::from_lookup(lookup(&[("FLOATCHAT_LLM_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_mock_replies_from_env() {
        let config = LlmConfig::from_lookup(lookup(&[
            ("FLOATCHAT_LLM_PROVIDER", "mock"),
            ("FLOATCHAT_MOCK_PLAN", "[{\"function\":\"byId\",\"args\":{\"profile_id\":1}}]"),
            ("FLOATCHAT_MOCK_ANSWER", "one profile"),
        ]))
        .unwrap();
        assert_eq!(config.provider, Provider::Mock);
        assert_eq!(config.canned_replies.len(), 2);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url(Some("localhost:11434/"), DEFAULT_OLLAMA_HOST),
            "http://localhost:11434"
        );
        assert_eq!(normalize_base_url(None, DEFAULT_OLLAMA_HOST), DEFAULT_OLLAMA_HOST);
    }
}

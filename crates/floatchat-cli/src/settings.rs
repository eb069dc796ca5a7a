//! Runtime settings.
//!
//! Read from the process environment after an optional `.env` file has been
//! loaded. Every key has a default, so an empty environment yields a local
//! Ollama deployment backed by an empty in-memory store.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use floatchat_llm::config::DEFAULT_OLLAMA_HOST;
use floatchat_llm::LlmConfig;
use floatchat_query::{EngineConfig, RerankAnchor, DEFAULT_RERANK_LIMIT};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_EMBED_MODEL: &str = "all-minilm";
pub const MAX_RERANK_LIMIT: usize = 50;
pub const MAX_ADAPTER_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedBackend {
    TokenHash,
    Ollama,
}

impl EmbedBackend {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token-hash" | "tokenhash" | "hash" => Ok(Self::TokenHash),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!(
                "FLOATCHAT_EMBED_BACKEND: unknown backend `{other}` (expected token-hash|ollama)"
            )),
        }
    }
}

/// Which origins may call the HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            CorsOrigins::Any
        } else {
            CorsOrigins::List(origins)
        }
    }

    /// Value for `Access-Control-Allow-Origin`, if the origin is allowed.
    pub fn allow(&self, origin: Option<&str>) -> Option<String> {
        match self {
            CorsOrigins::Any => Some("*".to_string()),
            CorsOrigins::List(list) => {
                let origin = origin?;
                list.iter().find(|o| *o == origin).cloned()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database holding the `argo_data` table.
    pub database: Option<PathBuf>,
    /// JSON / JSON Lines snapshot for the in-memory store.
    pub records: Option<PathBuf>,
    /// JSON Lines reference documents for the similarity index.
    pub corpus: Option<PathBuf>,
    pub embed_backend: EmbedBackend,
    pub embed_model: String,
    /// Ollama server used by the `ollama` embed backend.
    pub ollama_host: String,
    pub rerank_limit: usize,
    pub rerank_anchor: RerankAnchor,
    pub adapter_timeout: Option<Duration>,
    pub listen: SocketAddr,
    pub cors: CorsOrigins,
    pub llm: LlmConfig,
}

impl Settings {
    /// Load `.env` (if present) and read the environment.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(anyhow!("failed to load .env: {e}")),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rerank_limit = match get("FLOATCHAT_RERANK_LIMIT") {
            Some(raw) => parse_in_range("FLOATCHAT_RERANK_LIMIT", &raw, 1, MAX_RERANK_LIMIT as u64)? as usize,
            None => DEFAULT_RERANK_LIMIT,
        };
        let adapter_timeout = match get("FLOATCHAT_ADAPTER_TIMEOUT_SECS") {
            Some(raw) => {
                match parse_in_range("FLOATCHAT_ADAPTER_TIMEOUT_SECS", &raw, 0, MAX_ADAPTER_TIMEOUT_SECS)? {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                }
            }
            None => None,
        };
        let rerank_anchor = match get("FLOATCHAT_RERANK_ANCHOR") {
            Some(raw) => raw
                .parse::<RerankAnchor>()
                .map_err(|e| anyhow!("FLOATCHAT_RERANK_ANCHOR: {e}"))?,
            None => RerankAnchor::default(),
        };
        let listen_raw = get("FLOATCHAT_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("FLOATCHAT_LISTEN: invalid socket address `{listen_raw}`"))?;

        Ok(Self {
            database: get("FLOATCHAT_DATABASE").map(PathBuf::from),
            records: get("FLOATCHAT_RECORDS").map(PathBuf::from),
            corpus: get("FLOATCHAT_CORPUS").map(PathBuf::from),
            embed_backend: get("FLOATCHAT_EMBED_BACKEND")
                .map(|b| EmbedBackend::parse(&b))
                .transpose()?
                .unwrap_or(EmbedBackend::TokenHash),
            embed_model: get("FLOATCHAT_EMBED_MODEL").unwrap_or_else(|| DEFAULT_EMBED_MODEL.to_string()),
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            rerank_limit,
            rerank_anchor,
            adapter_timeout,
            listen,
            cors: CorsOrigins::parse(&get("FLOATCHAT_CORS_ORIGINS").unwrap_or_else(|| "*".to_string())),
            llm: LlmConfig::from_lookup(&lookup).context("language model settings")?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            rerank_limit: self.rerank_limit,
            rerank_anchor: self.rerank_anchor,
            adapter_timeout: self.adapter_timeout,
        }
    }
}

fn parse_in_range(key: &str, raw: &str, min: u64, max: u64) -> Result<u64> {
    let value: u64 = raw
        .parse()
        .map_err(|_| anyhow!("{key} must be a non-negative integer (got `{raw}`)"))?;
    if !(min..=max).contains(&value) {
        return Err(anyhow!("{key} must be between {min} and {max} (got {value})"));
    }
    Ok(value)
}

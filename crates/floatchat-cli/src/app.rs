//! Adapter construction from [`Settings`].

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use floatchat_index::{load_corpus, CorpusIndex, Embedder, OllamaEmbedder, TokenHashEmbedder};
use floatchat_llm::client_from_config;
use floatchat_query::QueryEngine;
use floatchat_store::{MemoryStore, SqliteStore, StructuredStore};

use crate::settings::{EmbedBackend, Settings};

pub fn build_store(settings: &Settings) -> Result<Arc<dyn StructuredStore>> {
    let store: Arc<dyn StructuredStore> = match (&settings.database, &settings.records) {
        (Some(db), _) => Arc::new(
            SqliteStore::open(db).with_context(|| format!("failed to open database {}", db.display()))?,
        ),
        (None, Some(path)) => Arc::new(
            MemoryStore::load_json(path)
                .with_context(|| format!("failed to load records from {}", path.display()))?,
        ),
        (None, None) => {
            tracing::warn!("neither FLOATCHAT_DATABASE nor FLOATCHAT_RECORDS is set; store is empty");
            Arc::new(MemoryStore::new())
        }
    };
    tracing::info!(store = %store.describe(), "structured store ready");
    Ok(store)
}

pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    Ok(match settings.embed_backend {
        EmbedBackend::TokenHash => Arc::new(TokenHashEmbedder::default()),
        EmbedBackend::Ollama => {
            Arc::new(
                OllamaEmbedder::new(&settings.ollama_host, &settings.embed_model, settings.adapter_timeout)
                    .map_err(|e| anyhow!("failed to build embedder: {e}"))?,
            )
        }
    })
}

pub async fn build_index(settings: &Settings) -> Result<Arc<CorpusIndex>> {
    let documents = match &settings.corpus {
        Some(path) => load_corpus(path)
            .with_context(|| format!("failed to load corpus from {}", path.display()))?,
        None => Vec::new(),
    };
    let index = CorpusIndex::build(build_embedder(settings)?, documents)
        .await
        .context("failed to build similarity index")?;
    Ok(Arc::new(index))
}

/// Store, index, and model wired into one engine.
pub async fn build_engine(settings: &Settings) -> Result<QueryEngine> {
    let store = build_store(settings)?;
    let index = build_index(settings).await?;
    let llm = client_from_config(settings.llm.clone()).context("failed to build language model client")?;
    Ok(QueryEngine::new(store, index, llm, settings.engine_config()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[tokio::test]
    async fn test_build_engine_from_files() {
        let mut records = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            records,
            r#"{{"id":1,"time":"2022-08-15","lat":12.0,"lon":72.0,"temperature":28.5}}"#
        )
        .unwrap();
        let mut corpus = tempfile::NamedTempFile::new().unwrap();
        writeln!(corpus, r#"{{"id":"1","document":"Profile 1 warm Arabian Sea"}}"#).unwrap();

        let env: HashMap<&str, String> = HashMap::from([
            ("FLOATCHAT_RECORDS", records.path().display().to_string()),
            ("FLOATCHAT_CORPUS", corpus.path().display().to_string()),
            ("FLOATCHAT_LLM_PROVIDER", "mock".to_string()),
        ]);
        let settings = Settings::from_lookup(|k: &str| env.get(k).cloned()).unwrap();

        let store = build_store(&settings).unwrap();
        assert_eq!(store.describe(), "memory(1 records)");
        let index = build_index(&settings).await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(build_engine(&settings).await.is_ok());
    }

    #[test]
    fn test_missing_records_file_is_an_error() {
        let env: HashMap<&str, String> =
            HashMap::from([("FLOATCHAT_RECORDS", "/definitely/not/here.jsonl".to_string())]);
        let settings = Settings::from_lookup(|k: &str| env.get(k).cloned()).unwrap();
        let err = build_store(&settings).err().unwrap();
        assert!(err.to_string().contains("failed to load records"));
    }
}

//! Reference documents written by the ingestion pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::IndexError;

/// One indexed document, e.g.
/// `Profile 2902746 at 2022-08-15 (12.1,72.4), Temp class hot, ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    #[serde(alias = "description", alias = "text")]
    pub document: String,
}

impl CorpusDocument {
    pub fn new(id: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
        }
    }
}

/// Load a JSON array or JSON Lines corpus file.
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusDocument>, IndexError> {
    let text = std::fs::read_to_string(path)?;
    let docs = parse_corpus(&text)?;
    tracing::info!(path = %path.display(), count = docs.len(), "loaded similarity corpus");
    Ok(docs)
}

pub fn parse_corpus(text: &str) -> Result<Vec<CorpusDocument>, IndexError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| IndexError::InvalidCorpus(e.to_string()));
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line.trim())
                .map_err(|e| IndexError::InvalidCorpus(format!("line {}: {e}", i + 1)))
        })
        .collect()
}

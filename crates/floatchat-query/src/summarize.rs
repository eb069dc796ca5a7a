//! Evidence formatting and the summarization call.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use floatchat_llm::LanguageModel;
use floatchat_store::Record;

use crate::error::{bounded, QueryError, Stage, StagedLlmError};
use crate::prompts;

/// `Profile <id>: Temp=<t>, Salinity=<s>, Lat=<lat>, Lon=<lon>, Time=<date>`
pub fn format_record(record: &Record) -> String {
    format!(
        "Profile {}: Temp={}, Salinity={}, Lat={}, Lon={}, Time={}",
        record.id,
        or_na(record.temperature),
        or_na(record.salinity),
        record.lat,
        record.lon,
        record.time.format("%Y-%m-%d"),
    )
}

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

/// One line per record, in rank order.
pub fn format_evidence(ranked: &[Record]) -> String {
    ranked
        .iter()
        .map(format_record)
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct Summarizer {
    llm: Arc<dyn LanguageModel>,
    timeout: Option<Duration>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm, timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The model's reply, verbatim.
    pub async fn summarize(&self, prompt: &str, ranked: &[Record]) -> Result<String, QueryError> {
        let message = prompts::summary_message(prompt, &format_evidence(ranked));
        let call = async {
            self.llm
                .complete(prompts::SUMMARY_INSTRUCTION, &message)
                .await
                .map_err(|e| StagedLlmError(Stage::Summarize, e))
        };
        bounded(Stage::Summarize, self.timeout, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use floatchat_llm::ScriptedModel;

    fn record() -> Record {
        Record::new(42, NaiveDate::from_ymd_opt(2022, 8, 15).unwrap(), 12.5, 72.25)
            .with_temperature(28.4)
    }

    #[test]
    fn test_format_record() {
        assert_eq!(
            format_record(&record()),
            "Profile 42: Temp=28.4, Salinity=n/a, Lat=12.5, Lon=72.25, Time=2022-08-15"
        );
    }

    #[tokio::test]
    async fn test_summarize_sends_prompt_and_evidence() {
        let model = Arc::new(ScriptedModel::always("Warm surface water."));
        let summarizer = Summarizer::new(model.clone());
        let ranked = vec![record(), record().with_salinity(35.1)];

        let answer = summarizer.summarize("How warm?", &ranked).await.unwrap();
        assert_eq!(answer, "Warm surface water.");

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        let (system, user) = &calls[0];
        assert_eq!(system, prompts::SUMMARY_INSTRUCTION);
        assert!(user.starts_with("User asked: How warm?"));
        assert_eq!(user.lines().filter(|l| l.starts_with("Profile 42:")).count(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_is_tagged() {
        let summarizer = Summarizer::new(Arc::new(ScriptedModel::failing("offline")));
        let err = summarizer.summarize("q", &[record()]).await.unwrap_err();
        assert!(matches!(err, QueryError::Llm { stage: Stage::Summarize, .. }));
    }
}

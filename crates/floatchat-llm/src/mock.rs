//! Scripted model for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{LanguageModel, LlmConfig, LlmError};

/// Replays canned replies in order, cycling when exhausted, and records
/// every `(system, user)` pair it is asked about.
pub struct ScriptedModel {
    replies: Vec<String>,
    next: AtomicUsize,
    calls: Mutex<Vec<(String, String)>>,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            next: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            fail_with: None,
            delay: None,
        }
    }

    /// Plan reply first, summary reply second.
    pub fn plan_then_answer(plan: &str, answer: &str) -> Self {
        Self::new(vec![plan.to_string(), answer.to_string()])
    }

    pub fn always(reply: &str) -> Self {
        Self::new(vec![reply.to_string()])
    }

    /// Every call fails with a network error.
    pub fn failing(message: &str) -> Self {
        let mut model = Self::new(Vec::new());
        model.fail_with = Some(message.to_string());
        model
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.canned_replies.clone())
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        self.calls
            .lock()
            .push((system.to_string(), user.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.fail_with {
            return Err(LlmError::Network(msg.clone()));
        }
        if self.replies.is_empty() {
            return Err(LlmError::InvalidResponse("scripted model has no replies".into()));
        }
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(self.replies[idx % self.replies.len()].clone())
    }

    fn describe(&self) -> String {
        format!("mock(scripted, {} replies)", self.replies.len())
    }
}

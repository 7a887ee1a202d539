//! Scripted mock provider for tests: plays back queued replies and records
//! every request it sees.

use parking_lot::Mutex;
use std::collections::VecDeque;

use orc_domain::{ActionError, ChatMessage, Result, ToolCallRequest, ToolDefinition};

use crate::traits::ChatCompletion;

#[derive(Default)]
pub struct MockChat {
    plain_replies: Mutex<VecDeque<String>>,
    tool_replies: Mutex<VecDeque<Vec<ToolCallRequest>>>,
    /// Every (system, history) pair received, latest last.
    pub requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    /// When set, every call fails with this detail.
    fail_with: Mutex<Option<String>>,
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_plain(&self, reply: impl Into<String>) {
        self.plain_replies.lock().push_back(reply.into());
    }

    pub fn queue_tools(&self, calls: Vec<ToolCallRequest>) {
        self.tool_replies.lock().push_back(calls);
    }

    pub fn fail_with(&self, detail: impl Into<String>) {
        *self.fail_with.lock() = Some(detail.into());
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn record(&self, system: &str, history: &[ChatMessage]) -> Result<()> {
        if let Some(detail) = self.fail_with.lock().clone() {
            return Err(ActionError::llm(detail));
        }
        self.requests
            .lock()
            .push((system.to_owned(), history.to_vec()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatCompletion for MockChat {
    async fn decide_with_tools(
        &self,
        system: &str,
        history: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<Vec<ToolCallRequest>> {
        self.record(system, history)?;
        Ok(self.tool_replies.lock().pop_front().unwrap_or_default())
    }

    async fn decide_plain(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        self.record(system, history)?;
        Ok(self.plain_replies.lock().pop_front().unwrap_or_default())
    }

    fn provider_id(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_back_queued_replies_in_order() {
        let mock = MockChat::new();
        mock.queue_plain("first");
        mock.queue_plain("second");
        assert_eq!(mock.decide_plain("s", &[]).await.unwrap(), "first");
        assert_eq!(mock.decide_plain("s", &[]).await.unwrap(), "second");
        // Exhausted queue yields the empty reply, not an error.
        assert_eq!(mock.decide_plain("s", &[]).await.unwrap(), "");
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn failure_mode_returns_llm_error() {
        let mock = MockChat::new();
        mock.fail_with("rate limited");
        let err = mock.decide_plain("s", &[]).await.unwrap_err();
        assert_eq!(err.kind, orc_domain::ErrorKind::LlmError);
    }
}

//! Agent conversation memory and the failure history.
//!
//! Memory is the immutable system prompt plus a bounded FIFO of
//! `{role, content}` turns; the eldest entries are dropped past
//! `max_memory_length`. Failures keep the last ten records and feed the
//! next status update.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::Value;

use orc_domain::ChatMessage;

pub struct AgentMemory {
    system_prompt: Option<String>,
    history: VecDeque<ChatMessage>,
    max_memory_length: usize,
}

impl AgentMemory {
    pub fn new(max_memory_length: usize) -> Self {
        Self {
            system_prompt: None,
            history: VecDeque::new(),
            max_memory_length: max_memory_length.max(1),
        }
    }

    /// Set the system prompt and reset the history.
    pub fn initialize(&mut self, system_prompt: impl Into<String>) {
        self.system_prompt = Some(system_prompt.into());
        self.history.clear();
    }

    pub fn is_initialized(&self) -> bool {
        self.system_prompt.is_some()
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or_default()
    }

    fn push(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > self.max_memory_length {
            self.history.pop_front();
        }
    }

    /// Append a status update as a user turn.
    pub fn add_status_update(&mut self, status_update: &str) {
        self.push(ChatMessage::user(format!("STATUS UPDATE:\n{status_update}")));
    }

    /// Append the agent's reply (or an action outcome) as an assistant turn.
    pub fn add_agent_response(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::assistant(content));
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// One failed action, kept as context for the agent's next decision.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub action: String,
    pub arguments: Value,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
}

/// Bounded FIFO of failure records.
pub struct FailureLog {
    records: VecDeque<FailureRecord>,
    capacity: usize,
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::new(10)
    }
}

impl FailureLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, action: &str, arguments: Value, error: &str, cycle: u64) {
        self.records.push_back(FailureRecord {
            action: action.to_owned(),
            arguments,
            error: error.to_owned(),
            timestamp: Utc::now(),
            cycle,
        });
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Human-readable summary for the status update.
    pub fn summary(&self) -> String {
        if self.records.is_empty() {
            return "(none)".to_owned();
        }
        self.records
            .iter()
            .map(|r| {
                format!(
                    "- cycle {}: {} failed: {}",
                    r.cycle, r.action, r.error
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

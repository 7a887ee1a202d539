//! Anthropic Messages API adapter (non-streaming).
//!
//! The system prompt travels in the top-level `system` field; tool
//! definitions use `input_schema`; tool calls come back as `tool_use`
//! content blocks.

use serde_json::{json, Value};

use orc_domain::{ActionError, ChatMessage, ChatRole, Result, ToolCallRequest, ToolDefinition};

use crate::traits::{ChatCompletion, ChatOptions};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicChat {
    base_url: String,
    api_key: String,
    options: ChatOptions,
    client: reqwest::Client,
}

impl AnthropicChat {
    pub fn new(api_key: impl Into<String>, mut options: ChatOptions) -> Result<Self> {
        if options.model.is_empty() {
            options.model = DEFAULT_MODEL.to_owned();
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ActionError::llm(format!("http client: {e}")))?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            options,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.base_url = self.base_url.trim_end_matches('/').to_owned();
        self
    }

    fn build_body(&self, system: &str, history: &[ChatMessage], tools: &[ToolDefinition]) -> Value {
        // System turns inside the history fold into the top-level field.
        let mut system_parts = vec![system.to_owned()];
        let mut messages: Vec<Value> = Vec::new();
        for msg in history {
            match msg.role {
                ChatRole::System => system_parts.push(msg.content.clone()),
                ChatRole::User => messages.push(json!({"role": "user", "content": msg.content})),
                ChatRole::Assistant => {
                    messages.push(json!({"role": "assistant", "content": msg.content}))
                }
            }
        }
        // The API requires at least one message and a leading user turn.
        if messages.is_empty() {
            messages.push(json!({"role": "user", "content": "Proceed."}));
        }

        let mut body = json!({
            "model": self.options.model,
            "system": system_parts.join("\n\n"),
            "messages": messages,
            "temperature": self.options.temperature,
            "max_tokens": self.options.max_tokens,
        });
        if !tools.is_empty() {
            let specs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(specs);
        }
        body
    }

    async fn post(&self, body: Value) -> Result<Value> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::llm(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ActionError::llm(format!("anthropic response decode failed: {e}")))?;
        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(ActionError::llm(format!("anthropic {status}: {detail}")));
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl ChatCompletion for AnthropicChat {
    async fn decide_with_tools(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Vec<ToolCallRequest>> {
        let payload = self.post(self.build_body(system, history, tools)).await?;
        let mut calls = Vec::new();
        if let Some(blocks) = payload["content"].as_array() {
            for block in blocks {
                if block["type"] == "tool_use" {
                    let name = block["name"].as_str().unwrap_or_default();
                    if name.is_empty() {
                        continue;
                    }
                    calls.push(ToolCallRequest::new(
                        name,
                        block["input"].clone(),
                    ));
                }
            }
        }
        Ok(calls)
    }

    async fn decide_plain(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let payload = self.post(self.build_body(system, history, &[])).await?;
        let mut text = String::new();
        if let Some(blocks) = payload["content"].as_array() {
            for block in blocks {
                if block["type"] == "text" {
                    text.push_str(block["text"].as_str().unwrap_or_default());
                }
            }
        }
        Ok(text)
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.options.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_goes_in_the_top_level_field() {
        let chat = AnthropicChat::new("key", ChatOptions::default()).unwrap();
        let history = vec![ChatMessage::user("hello")];
        let body = chat.build_body("sys", &history, &[]);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body["max_tokens"].as_u64().unwrap() > 0);
    }

    #[test]
    fn empty_history_gets_a_seed_user_turn() {
        let chat = AnthropicChat::new("key", ChatOptions::default()).unwrap();
        let body = chat.build_body("sys", &[], &[]);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tools_use_input_schema() {
        let chat = AnthropicChat::new("key", ChatOptions::default()).unwrap();
        let tools = vec![ToolDefinition {
            name: "submit_vote".into(),
            description: "vote".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = chat.build_body("sys", &[], &tools);
        assert_eq!(body["tools"][0]["name"], "submit_vote");
        assert!(body["tools"][0].get("input_schema").is_some());
    }
}

//! OpenAI chat-completions adapter (non-streaming).

use serde_json::{json, Value};

use orc_domain::{ActionError, ChatMessage, ChatRole, Result, ToolCallRequest, ToolDefinition};

use crate::traits::{ChatCompletion, ChatOptions};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiChat {
    base_url: String,
    api_key: String,
    options: ChatOptions,
    client: reqwest::Client,
}

impl OpenAiChat {
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
        let mut messages = vec![json!({"role": "system", "content": system})];
        for msg in history {
            let role = match msg.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": msg.content}));
        }
        let mut body = json!({
            "model": self.options.model,
            "messages": messages,
            "temperature": self.options.temperature,
            "max_tokens": self.options.max_tokens,
        });
        if !tools.is_empty() {
            let specs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(specs);
        }
        body
    }

    async fn post(&self, body: Value) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::llm(format!("openai request failed: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| ActionError::llm(format!("openai response decode failed: {e}")))?;
        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(ActionError::llm(format!("openai {status}: {detail}")));
        }
        Ok(payload)
    }
}

#[async_trait::async_trait]
impl ChatCompletion for OpenAiChat {
    async fn decide_with_tools(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Vec<ToolCallRequest>> {
        let payload = self.post(self.build_body(system, history, tools)).await?;
        let message = &payload["choices"][0]["message"];

        let mut calls = Vec::new();
        if let Some(tool_calls) = message["tool_calls"].as_array() {
            for call in tool_calls {
                let name = call["function"]["name"].as_str().unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let raw_args = call["function"]["arguments"].as_str().unwrap_or("{}");
                let arguments = match serde_json::from_str(raw_args) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::warn!(
                            tool = name,
                            error = %err,
                            "tool call arguments are not valid JSON; defaulting to empty object"
                        );
                        Value::Object(Default::default())
                    }
                };
                calls.push(ToolCallRequest::new(name, arguments));
            }
        }
        Ok(calls)
    }

    async fn decide_plain(&self, system: &str, history: &[ChatMessage]) -> Result<String> {
        let payload = self.post(self.build_body(system, history, &[])).await?;
        Ok(payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_owned())
    }

    fn provider_id(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.options.model
    }
}

//! The provider-agnostic chat-completion trait and its options.

use orc_domain::{ChatMessage, Result, ToolCallRequest, ToolDefinition};

/// How the agent consumes the model: native function calling, or a free
/// JSON plan embedded in the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    Function,
    Json,
}

impl Default for PortMode {
    fn default() -> Self {
        PortMode::Function
    }
}

/// Options forwarded to the provider on every call.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.4,
            max_tokens: 4096,
        }
    }
}

/// Trait every LLM adapter implements.
///
/// Both calls take the immutable system prompt plus the agent's bounded
/// conversation history (a single-user-turn conversation is the degenerate
/// case). Errors are well-typed `LLMError`s; the agent controller treats
/// them as zero tool calls with a recorded failure.
#[async_trait::async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Ask the model to choose tool calls from `tools`. Zero calls is a
    /// valid answer.
    async fn decide_with_tools(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Vec<ToolCallRequest>>;

    /// Ask the model for a plain reply, expected to contain a JSON plan.
    async fn decide_plain(&self, system: &str, history: &[ChatMessage]) -> Result<String>;

    /// A stable identifier for logs (`openai`, `anthropic`, `mock`).
    fn provider_id(&self) -> &str;

    /// The model name requests are sent with.
    fn model_name(&self) -> &str;
}

//! Provider selection: explicit choice first, then whichever API key is
//! present in the environment.

use std::sync::Arc;

use orc_domain::{ActionError, Result};

use crate::anthropic::AnthropicChat;
use crate::openai::OpenAiChat;
use crate::traits::{ChatCompletion, ChatOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for Provider {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            other => Err(ActionError::llm(format!("unknown provider '{other}'"))),
        }
    }
}

/// Build a provider from the environment. An explicit `choice` wins; with
/// none, the first of `OPENAI_API_KEY`, `ANTHROPIC_API_KEY` present decides.
pub fn provider_from_env(
    choice: Option<Provider>,
    options: ChatOptions,
) -> Result<Arc<dyn ChatCompletion>> {
    let openai_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    let anthropic_key = std::env::var("ANTHROPIC_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    let provider = match choice {
        Some(p) => p,
        None if openai_key.is_some() => Provider::OpenAi,
        None if anthropic_key.is_some() => Provider::Anthropic,
        None => {
            return Err(ActionError::llm(
                "no LLM API key available: set OPENAI_API_KEY or ANTHROPIC_API_KEY",
            ))
        }
    };

    match provider {
        Provider::OpenAi => {
            let key = openai_key
                .ok_or_else(|| ActionError::llm("OPENAI_API_KEY is not set"))?;
            Ok(Arc::new(OpenAiChat::new(key, options)?))
        }
        Provider::Anthropic => {
            let key = anthropic_key
                .ok_or_else(|| ActionError::llm("ANTHROPIC_API_KEY is not set"))?;
            Ok(Arc::new(AnthropicChat::new(key, options)?))
        }
    }
}

//! The ChatCompletion Port: adapters over LLM providers.
//!
//! Two call shapes: `decide_with_tools` returns the model's tool calls
//! (zero allowed); `decide_plain` returns free text expected to contain a
//! JSON plan. Provider failures surface as typed `LLMError` values; the
//! port never panics and never raises across the boundary.

pub mod anthropic;
pub mod extract;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod traits;

pub use anthropic::AnthropicChat;
pub use extract::{extract_json_block, parse_plan};
pub use mock::MockChat;
pub use openai::OpenAiChat;
pub use registry::{provider_from_env, Provider};
pub use traits::{ChatCompletion, ChatOptions, PortMode};

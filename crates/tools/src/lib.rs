//! The Tool Surface: the closed function-call API agents act through.
//!
//! One schema table is emitted in two dialects (OpenAI function calling and
//! Anthropic tool use). The dispatcher stamps the caller's identity over
//! whatever the model guessed, applies the session's communication-level
//! policy, rejects placeholder transaction ids, and forwards to the engine.

pub mod schema;
pub mod surface;

pub use schema::{tool_definitions, tool_specs, ToolDialect};
pub use surface::{CallerIdentity, ToolSurface};

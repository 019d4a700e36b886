//! Inference client for perfsleuth.
//!
//! Speaks the OpenAI-compatible chat/tool-calling dialect and wraps it in a
//! bounded retry layer.

mod client;
mod error;
mod openai;
mod retry;
mod types;

pub use client::{ChatBackend, LlmClient, validate_tool_name};
pub use error::{LlmError, Result};
pub use retry::{RetryPolicy, RetryingBackend};
pub use types::{ChatMessage, ChatResponse, ModelTurn, Role, ToolCall, ToolDefinition, Usage};

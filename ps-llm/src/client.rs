use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};
use async_trait::async_trait;
use std::time::Duration;

const TOOL_NAME_MAX_LEN: usize = 64;

/// Anything that can take a transcript plus tool schemas and produce one model turn.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
    -> Result<ChatResponse>;
}

#[derive(Clone)]
pub struct LlmClient {
    inner: OpenAiClient,
    model: String,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        endpoint: &str,
        api_key: Option<&str>,
        model: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        if endpoint.trim().is_empty() {
            return Err(LlmError::InvalidInput(
                "inference endpoint is required".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model is required".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::InvalidInput(format!("build http client: {e}")))?;
        let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());
        Ok(Self {
            inner: OpenAiClient::new(http, endpoint, api_key, model),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    #[tracing::instrument(level = "info", skip_all)]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        self.inner.chat(messages, tools).await
    }
}

/// OpenAI-compatible tool names must match `^[a-zA-Z0-9_-]{1,64}$`.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > TOOL_NAME_MAX_LEN {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} must be 1..={TOOL_NAME_MAX_LEN} characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-'))
    {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}

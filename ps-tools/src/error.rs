use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Timeouts, dropped connections and 5xx from the source API.
    #[error("source api unavailable: {0}")]
    Transport(String),

    /// Unusable setup; only raised while building clients and registries.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return Self::Transport(e.to_string());
        }
        if e.is_decode() {
            return Self::ExecutionFailed(format!("decode response: {e}"));
        }
        Self::ExecutionFailed(e.to_string())
    }
}

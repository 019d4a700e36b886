use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("http status {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Parsed from a `Retry-After` header when the endpoint sent one.
        retry_after: Option<Duration>,
    },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl LlmError {
    /// Transient failures worth re-sending the same request for.
    ///
    /// Timeouts, dropped connections, 5xx, 408 and 429 are retryable.
    /// Authentication failures, malformed requests and every other 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) => true,
            Self::Status { status, .. } => {
                *status == 408 || *status == 429 || (500..=599).contains(status)
            }
            Self::InvalidInput(_) | Self::ResponseFormat(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::Status {
                status: status.as_u16(),
                body: e.to_string(),
                retry_after: None,
            };
        }
        if e.is_decode() {
            return Self::ResponseFormat(e.to_string());
        }
        if e.is_builder() {
            return Self::InvalidInput(e.to_string());
        }
        Self::Connection(e.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}

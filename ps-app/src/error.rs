use ps_llm::LlmError;
use ps_tools::ToolError;
use thiserror::Error;

/// Failures that end an analysis without an answer.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid change reference: {0}")]
    InvalidTarget(String),

    /// Unusable setup, raised before the first model turn.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Fatal inference failure, or transient failures that outlasted the retry budget.
    #[error("inference failed: {0}")]
    Inference(#[from] LlmError),
}

impl From<ToolError> for AnalysisError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Configuration(other.to_string()),
        }
    }
}

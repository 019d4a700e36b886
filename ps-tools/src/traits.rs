use crate::error::{Result, ToolError};
use async_trait::async_trait;

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// Text handed back to the model for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    /// A size cap or page ceiling cut the result short.
    pub truncated: bool,
    /// The source API refused the call because of its rate limit.
    pub rate_limited: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
            rate_limited: false,
        }
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    pub fn with_rate_limited(mut self, rate_limited: bool) -> Self {
        self.rate_limited = rate_limited;
        self
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput>;
}

pub fn to_llm_tool_def(tool: &dyn Tool) -> ps_llm::ToolDefinition {
    let spec = tool.spec();
    ps_llm::ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        serde_json::Value::String(_) => Err(ToolError::InvalidArguments(format!(
            "key {key} must not be empty"
        ))),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

/// Missing, null and blank strings all read as `None`.
pub(crate) fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_string_rejects_missing_blank_and_non_string() {
        assert_eq!(
            require_string(&json!({"file_path": " a/b.go "}), "file_path").expect("present"),
            "a/b.go"
        );
        for args in [json!({}), json!({"file_path": "  "}), json!({"file_path": 3})] {
            let err = require_string(&args, "file_path").expect_err("invalid");
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }

    #[test]
    fn optional_string_treats_blank_as_absent() {
        assert_eq!(optional_string(&json!({}), "ref").expect("ok"), None);
        assert_eq!(optional_string(&json!({"ref": null}), "ref").expect("ok"), None);
        assert_eq!(optional_string(&json!({"ref": ""}), "ref").expect("ok"), None);
        assert_eq!(
            optional_string(&json!({"ref": "v1.2"}), "ref").expect("ok"),
            Some("v1.2".to_string())
        );
        assert!(optional_string(&json!({"ref": true}), "ref").is_err());
    }
}

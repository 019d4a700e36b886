//! The fixed investigation tool set, bound to one analysis.

use crate::cache::InvestigationCache;
use crate::context::InvestigationContext;
use crate::error::{Result, ToolError};
use crate::github::{GithubClient, SourceLimits};
use crate::source::SourceApi;
use crate::traits::{Tool, ToolOutput, ToolSpec, optional_string, require_string, to_llm_tool_def};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ChangedFiles,
    ChangeDiff,
    FileDiff,
    Description,
    FileContent,
    Commits,
    Comments,
    Directory,
    Search,
}

impl ToolKind {
    pub const ALL: [ToolKind; 9] = [
        ToolKind::ChangedFiles,
        ToolKind::ChangeDiff,
        ToolKind::FileDiff,
        ToolKind::Description,
        ToolKind::FileContent,
        ToolKind::Commits,
        ToolKind::Comments,
        ToolKind::Directory,
        ToolKind::Search,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ChangedFiles => "get_pr_changed_files",
            ToolKind::ChangeDiff => "get_pr_diff",
            ToolKind::FileDiff => "get_file_diff",
            ToolKind::Description => "get_pr_description",
            ToolKind::FileContent => "get_file_content",
            ToolKind::Commits => "get_pr_commits",
            ToolKind::Comments => "get_pr_comments",
            ToolKind::Directory => "list_repo_directory",
            ToolKind::Search => "search_related_prs",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ToolKind::ChangedFiles => {
                "List production files changed by the pull request with per-file line counts, \
                 largest changes first. Test files are excluded. Start here."
            }
            ToolKind::ChangeDiff => {
                "Get the full unified diff of the pull request with test files removed. \
                 Large diffs are truncated; prefer get_file_diff for specific files."
            }
            ToolKind::FileDiff => {
                "Get the diff of one file changed by the pull request. Use exact paths from \
                 get_pr_changed_files."
            }
            ToolKind::Description => {
                "Get the pull request title, labels and description written by the author."
            }
            ToolKind::FileContent => {
                "Read a file from the repository at a branch, tag or commit (default main) to \
                 see code surrounding a change."
            }
            ToolKind::Commits => {
                "List the commits in the pull request, or the recent history of one file when \
                 file_path is given."
            }
            ToolKind::Comments => {
                "Get review and discussion comments on the pull request, newest first."
            }
            ToolKind::Directory => {
                "List a repository directory at a branch, tag or commit (default main)."
            }
            ToolKind::Search => {
                "Search other pull requests in the same repository, e.g. earlier fixes for the \
                 same component."
            }
        }
    }

    fn schema(self) -> Value {
        let no_args = json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {}
        });
        match self {
            ToolKind::ChangeDiff | ToolKind::Description | ToolKind::Comments => no_args,
            ToolKind::ChangedFiles => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "path_prefix": {
                        "type": "string",
                        "description": "Only list files under this directory, e.g. src/storage/"
                    }
                }
            }),
            ToolKind::FileDiff => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "file_path": { "type": "string", "description": "Repository-relative path" }
                },
                "required": ["file_path"]
            }),
            ToolKind::FileContent => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "file_path": { "type": "string", "description": "Repository-relative path" },
                    "ref": { "type": "string", "description": "Branch, tag or commit; default main" }
                },
                "required": ["file_path"]
            }),
            ToolKind::Commits => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Show recent commits touching this file instead"
                    }
                }
            }),
            ToolKind::Directory => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "path": { "type": "string", "description": "Directory path; empty for root" },
                    "ref": { "type": "string", "description": "Branch, tag or commit; default main" }
                }
            }),
            ToolKind::Search => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "query": { "type": "string", "description": "Keywords, e.g. a component name" }
                },
                "required": ["query"]
            }),
        }
    }
}

pub struct InvestigationTool {
    kind: ToolKind,
    source: Arc<SourceApi>,
}

#[async_trait]
impl Tool for InvestigationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.kind.name().to_string(),
            description: self.kind.description().to_string(),
            parameters_schema: self.kind.schema(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        if !arguments.is_object() {
            return Err(ToolError::InvalidArguments(
                "arguments must be a JSON object".to_string(),
            ));
        }
        let source = &self.source;
        match self.kind {
            ToolKind::ChangedFiles => {
                let prefix = optional_string(&arguments, "path_prefix")?;
                source.changed_files(prefix.as_deref()).await
            }
            ToolKind::ChangeDiff => source.change_diff().await,
            ToolKind::FileDiff => {
                let path = require_string(&arguments, "file_path")?;
                source.file_diff(&path).await
            }
            ToolKind::Description => source.description().await,
            ToolKind::FileContent => {
                let path = require_string(&arguments, "file_path")?;
                let git_ref = optional_string(&arguments, "ref")?;
                source.file_content(&path, git_ref.as_deref()).await
            }
            ToolKind::Commits => {
                let path = optional_string(&arguments, "file_path")?;
                source.commits(path.as_deref()).await
            }
            ToolKind::Comments => source.comments().await,
            ToolKind::Directory => {
                let path = optional_string(&arguments, "path")?;
                let git_ref = optional_string(&arguments, "ref")?;
                source.directory(path.as_deref(), git_ref.as_deref()).await
            }
            ToolKind::Search => {
                let query = require_string(&arguments, "query")?;
                source.search(&query).await
            }
        }
    }
}

/// Tools for one investigation. Dropping the registry releases its client.
pub struct ToolRegistry {
    tools: Vec<InvestigationTool>,
}

impl ToolRegistry {
    /// Only fails with [`ToolError::Configuration`].
    pub fn for_investigation(
        ctx: Arc<InvestigationContext>,
        api_base: &str,
        limits: SourceLimits,
        cache: Arc<InvestigationCache>,
    ) -> Result<Self> {
        let client = GithubClient::new(api_base, ctx.credential(), limits)?;
        let source = Arc::new(SourceApi::new(client, cache, ctx));
        let tools = ToolKind::ALL
            .into_iter()
            .map(|kind| InvestigationTool {
                kind,
                source: Arc::clone(&source),
            })
            .collect();
        Ok(Self { tools })
    }

    pub fn definitions(&self) -> Vec<ps_llm::ToolDefinition> {
        self.tools
            .iter()
            .map(|t| to_llm_tool_def(t as &dyn Tool))
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.kind.name()).collect()
    }

    /// Run one tool call. Every failure comes back as text for the model.
    #[tracing::instrument(level = "info", skip(self, arguments))]
    pub async fn invoke(&self, name: &str, arguments: &str) -> ToolOutput {
        let Some(tool) = self.tools.iter().find(|t| t.kind.name() == name) else {
            tracing::warn!(tool = name, "model requested unknown tool");
            return ToolOutput::text(format!(
                "Error: unknown tool '{name}'. Available tools: {}",
                self.names().join(", ")
            ));
        };

        let arguments = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(v) => v,
                Err(e) => {
                    return ToolOutput::text(format!(
                        "Error: arguments for {name} are not valid JSON: {e}"
                    ));
                }
            }
        };

        match tool.execute(arguments).await {
            Ok(output) => {
                tracing::debug!(
                    tool = name,
                    chars = output.text.len(),
                    truncated = output.truncated,
                    "tool call completed"
                );
                output
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                render_failure(name, e)
            }
        }
    }
}

fn render_failure(name: &str, error: ToolError) -> ToolOutput {
    match error {
        ToolError::RateLimited(msg) => ToolOutput {
            text: format!(
                "Error: source API rate limit exceeded while running {name}: {msg}. \
                 Work with the information gathered so far."
            ),
            truncated: false,
            rate_limited: true,
        },
        ToolError::InvalidArguments(msg) => {
            ToolOutput::text(format!("Error: invalid arguments for {name}: {msg}"))
        }
        ToolError::NotFound(msg) => ToolOutput::text(format!(
            "Error: not found: {msg}. Check the path or ref and try again."
        )),
        other => ToolOutput::text(format!("Error: {name} failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionId;
    use httpmock::prelude::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn registry(base: &str) -> ToolRegistry {
        let ctx = Arc::new(InvestigationContext::new(
            "acme",
            "engine",
            42,
            None,
            SessionId::new(),
        ));
        let limits = SourceLimits {
            request_timeout: Duration::from_secs(5),
            ..SourceLimits::default()
        };
        ToolRegistry::for_investigation(ctx, base, limits, Arc::new(InvestigationCache::new()))
            .expect("registry")
    }

    #[test]
    fn definitions_are_unique_and_valid() {
        let registry = registry("http://127.0.0.1:9");
        let defs = registry.definitions();
        assert_eq!(defs.len(), ToolKind::ALL.len());
        let names: HashSet<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names.len(), defs.len());
        for def in &defs {
            ps_llm::validate_tool_name(&def.name).expect("valid tool name");
            assert_eq!(def.parameters["type"], "object");
        }
    }

    #[test]
    fn unusable_setup_is_a_configuration_error() {
        let ctx = Arc::new(InvestigationContext::new(
            "acme",
            "engine",
            1,
            Some("line\nbreak".to_string()),
            SessionId::new(),
        ));
        let err = ToolRegistry::for_investigation(
            ctx,
            "https://api.github.com",
            SourceLimits::default(),
            Arc::new(InvestigationCache::new()),
        )
        .err()
        .expect("configuration error");
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[tokio::test]
    async fn bad_calls_become_text_without_requests() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.method(GET);
            then.status(200).body("[]");
        });
        let registry = registry(&server.base_url());

        let unknown = registry.invoke("delete_repo", "{}").await;
        assert!(unknown.text.starts_with("Error: unknown tool 'delete_repo'"));
        assert!(unknown.text.contains("get_pr_diff"));

        let malformed = registry.invoke("get_file_diff", "{\"file_path\":").await;
        assert!(malformed.text.contains("not valid JSON"));

        let missing = registry.invoke("get_file_content", "{}").await;
        assert!(missing.text.contains("invalid arguments for get_file_content"));

        let not_object = registry.invoke("search_related_prs", "[1]").await;
        assert!(not_object.text.contains("must be a JSON object"));

        assert_eq!(any.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limit_is_flagged_on_output() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/comments");
            then.status(429).body("slow down");
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/issues/42/comments");
            then.status(429).body("slow down");
        });

        let out = registry(&server.base_url())
            .invoke("get_pr_comments", "")
            .await;
        assert!(out.rate_limited);
        assert!(out.text.starts_with("Error: source API rate limit exceeded"));
    }

    #[tokio::test]
    async fn missing_file_is_reported_as_text() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/contents/src/gone.rs");
            then.status(404).body("{\"message\":\"Not Found\"}");
        });

        let out = registry(&server.base_url())
            .invoke("get_file_content", r#"{"file_path": "src/gone.rs"}"#)
            .await;
        assert!(!out.rate_limited);
        assert!(out.text.starts_with("Error: not found"), "{}", out.text);
    }
}

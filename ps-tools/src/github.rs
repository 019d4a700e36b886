//! Thin, bounded HTTP client for the GitHub REST API.
//!
//! Every request carries the configured timeout. Failures are classified into
//! [`ToolError`] variants; nothing is retried here.

use crate::context::InvestigationContext;
use crate::error::{Result, ToolError};
use crate::paginate::{PageLimits, Paged, paginate};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";
const API_VERSION: &str = "2022-11-28";
const ERROR_BODY_MAX: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLimits {
    pub request_timeout: Duration,
    pub per_page: u32,
    pub max_pages: u32,
    pub max_diff_chars: usize,
    pub max_file_chars: usize,
    pub max_changed_files: usize,
    pub max_commits: usize,
    pub max_comments_chars: usize,
    pub search_results: u32,
    pub file_commits_per_page: u32,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            per_page: 100,
            max_pages: 30,
            max_diff_chars: 40_000,
            max_file_chars: 15_000,
            max_changed_files: 50,
            max_commits: 50,
            max_comments_chars: 10_000,
            search_results: 5,
            file_commits_per_page: 20,
        }
    }
}

impl SourceLimits {
    pub fn pages(&self) -> PageLimits {
        PageLimits {
            per_page: self.per_page,
            max_pages: self.max_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    #[serde(default = "default_file_status")]
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub patch: Option<String>,
}

fn default_file_status() -> String {
    "modified".to_string()
}

impl ChangedFile {
    pub fn magnitude(&self) -> u64 {
        self.additions + self.deletions
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub head: GitRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// The contents endpoint answers with an array for directories and an object for files.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Directory(Vec<ContentEntry>),
    File(ContentEntry),
}

#[derive(Debug, Clone)]
pub enum FileFetch {
    Found(Contents),
    /// 403 that is not a rate limit: the contents API refuses files over 1 MB.
    TooLarge,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub created_at: String,
}

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    authenticated: bool,
    limits: SourceLimits,
}

impl GithubClient {
    /// Fails only when the setup is unusable (bad base URL, credential that cannot
    /// form a header, client build failure).
    pub fn new(api_base: &str, credential: Option<&str>, limits: SourceLimits) -> Result<Self> {
        let api_base = api_base.trim().trim_end_matches('/');
        reqwest::Url::parse(api_base).map_err(|e| {
            ToolError::Configuration(format!("invalid source api base {api_base:?}: {e}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(USER_AGENT, HeaderValue::from_static("perfsleuth"));

        let credential = credential.map(str::trim).filter(|c| !c.is_empty());
        if let Some(token) = credential {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ToolError::Configuration(
                    "source api credential contains characters not allowed in a header"
                        .to_string(),
                )
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            tracing::warn!("no source api credential configured; using unauthenticated rate limit");
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(limits.request_timeout)
            .build()
            .map_err(|e| ToolError::Configuration(format!("build source api client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.to_string(),
            authenticated: credential.is_some(),
            limits,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn limits(&self) -> &SourceLimits {
        &self.limits
    }

    fn repo_url(&self, ctx: &InvestigationContext, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base,
            ctx.org(),
            ctx.repo(),
            tail.trim_start_matches('/')
        )
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: Option<&'static str>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.get(url).query(query);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        Ok(request.send().await?)
    }

    async fn check(&self, what: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(self.classify_failure(what, status, &headers, &body))
    }

    fn classify_failure(
        &self,
        what: &str,
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> ToolError {
        let body = truncate_error_body(body);
        if is_rate_limited(status, headers, &body) {
            let reset = headers
                .get("x-ratelimit-reset")
                .and_then(|v| v.to_str().ok())
                .map(|v| format!(" (resets at unix time {v})"))
                .unwrap_or_default();
            let hint = if self.authenticated {
                ""
            } else {
                "; requests are unauthenticated, configure a source api token for a higher limit"
            };
            tracing::warn!(what, %status, authenticated = self.authenticated, "source api rate limited");
            return ToolError::RateLimited(format!("{what}: rate limit exceeded{reset}{hint}"));
        }
        match status.as_u16() {
            404 => ToolError::NotFound(format!("{what}: not found")),
            401 => ToolError::ExecutionFailed(format!("{what}: credential rejected (401)")),
            422 => ToolError::InvalidArguments(format!("{what}: rejected by api (422): {body}")),
            408 | 500..=599 => ToolError::Transport(format!("{what}: status={status} body={body}")),
            _ => ToolError::ExecutionFailed(format!("{what}: status={status} body={body}")),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.send(url, query, None).await?;
        let response = self.check(what, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("{what}: decode response: {e}")))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        what: &str,
        url: &str,
        extra: &[(&str, String)],
        per_page: u32,
        page: u32,
    ) -> Result<Vec<T>> {
        let mut query: Vec<(&str, String)> = extra.to_vec();
        query.push(("per_page", per_page.to_string()));
        query.push(("page", page.to_string()));
        self.get_json(what, url, &query).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label()))]
    pub async fn changed_files(&self, ctx: &InvestigationContext) -> Result<Paged<ChangedFile>> {
        let url = self.repo_url(ctx, &format!("pulls/{}/files", ctx.change_number()));
        let limits = self.limits.pages();
        paginate(limits, |page| {
            self.get_page("list changed files", &url, &[], limits.per_page, page)
        })
        .await
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label()))]
    pub async fn change_diff(&self, ctx: &InvestigationContext) -> Result<String> {
        let url = self.repo_url(ctx, &format!("pulls/{}", ctx.change_number()));
        let response = self.send(&url, &[], Some(ACCEPT_DIFF)).await?;
        let response = self.check("fetch change diff", response).await?;
        Ok(response.text().await?)
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label()))]
    pub async fn pull_request(&self, ctx: &InvestigationContext) -> Result<PullRequest> {
        let url = self.repo_url(ctx, &format!("pulls/{}", ctx.change_number()));
        self.get_json("fetch change metadata", &url, &[]).await
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label()))]
    pub async fn change_commits(&self, ctx: &InvestigationContext) -> Result<Paged<CommitEntry>> {
        let url = self.repo_url(ctx, &format!("pulls/{}/commits", ctx.change_number()));
        let limits = self.limits.pages();
        paginate(limits, |page| {
            self.get_page("list change commits", &url, &[], limits.per_page, page)
        })
        .await
    }

    /// One bounded page of commits reachable from `head_sha` that touch `path`.
    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label(), path = %path))]
    pub async fn commits_touching(
        &self,
        ctx: &InvestigationContext,
        head_sha: &str,
        path: &str,
    ) -> Result<Paged<CommitEntry>> {
        let url = self.repo_url(ctx, "commits");
        let limits = PageLimits {
            per_page: self.limits.file_commits_per_page,
            max_pages: 1,
        };
        let extra = [("sha", head_sha.to_string()), ("path", path.to_string())];
        paginate(limits, |page| {
            self.get_page("list file commits", &url, &extra, limits.per_page, page)
        })
        .await
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label()))]
    pub async fn review_comments(&self, ctx: &InvestigationContext) -> Result<Vec<Comment>> {
        let url = self.repo_url(ctx, &format!("pulls/{}/comments", ctx.change_number()));
        self.get_page("list review comments", &url, &[], self.limits.per_page, 1)
            .await
    }

    #[tracing::instrument(level = "info", skip_all, fields(change = %ctx.label()))]
    pub async fn discussion_comments(&self, ctx: &InvestigationContext) -> Result<Vec<Comment>> {
        let url = self.repo_url(ctx, &format!("issues/{}/comments", ctx.change_number()));
        self.get_page("list discussion comments", &url, &[], self.limits.per_page, 1)
            .await
    }

    #[tracing::instrument(level = "info", skip_all, fields(path = %path, git_ref = %git_ref))]
    pub async fn contents(
        &self,
        ctx: &InvestigationContext,
        path: &str,
        git_ref: &str,
    ) -> Result<FileFetch> {
        let url = self.repo_url(ctx, &format!("contents/{}", path.trim_start_matches('/')));
        let response = self
            .send(&url, &[("ref", git_ref.to_string())], None)
            .await?;
        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            if is_rate_limited(status, &headers, &body) {
                return Err(self.classify_failure("fetch contents", status, &headers, &body));
            }
            return Ok(FileFetch::TooLarge);
        }
        let response = self.check("fetch contents", response).await?;
        let contents = response
            .json::<Contents>()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("fetch contents: decode: {e}")))?;
        Ok(FileFetch::Found(contents))
    }

    #[tracing::instrument(level = "info", skip_all, fields(query = %query))]
    pub async fn search_changes(
        &self,
        ctx: &InvestigationContext,
        query: &str,
    ) -> Result<SearchResponse> {
        let url = format!("{}/search/issues", self.api_base);
        let q = format!("type:pr repo:{}/{} {}", ctx.org(), ctx.repo(), query);
        self.get_json(
            "search related changes",
            &url,
            &[
                ("q", q),
                ("sort", "updated".to_string()),
                ("per_page", self.limits.search_results.to_string()),
            ],
        )
        .await
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    if status != StatusCode::FORBIDDEN {
        return false;
    }
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    exhausted || body.to_ascii_lowercase().contains("rate limit")
}

fn truncate_error_body(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_MAX {
        return body.to_string();
    }
    let head: String = body.chars().take(ERROR_BODY_MAX).collect();
    format!("{head}...")
}

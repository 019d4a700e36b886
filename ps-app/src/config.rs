//! PerfSleuth configuration loader.
//!
//! TOML file, then `.env`/environment overrides, then validation.

use ps_llm::RetryPolicy;
use ps_tools::{DEFAULT_API_BASE, MIN_CHAR_BUDGET, SourceLimits};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct PerfsleuthConfig {
    pub inference: InferenceConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_inference_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_inference_timeout_seconds() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Absent means unauthenticated access with a much lower rate limit.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_source_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_max_changed_files")]
    pub max_changed_files: usize,
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    #[serde(default = "default_max_comments_chars")]
    pub max_comments_chars: usize,
    #[serde(default = "default_search_results")]
    pub search_results: u32,
    #[serde(default = "default_file_commits_per_page")]
    pub file_commits_per_page: u32,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_source_timeout_seconds() -> u64 {
    30
}

fn default_per_page() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    30
}

fn default_max_diff_chars() -> usize {
    40_000
}

fn default_max_file_chars() -> usize {
    15_000
}

fn default_max_changed_files() -> usize {
    50
}

fn default_max_commits() -> usize {
    50
}

fn default_max_comments_chars() -> usize {
    10_000
}

fn default_search_results() -> u32 {
    5
}

fn default_file_commits_per_page() -> u32 {
    20
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            request_timeout_seconds: default_source_timeout_seconds(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            max_diff_chars: default_max_diff_chars(),
            max_file_chars: default_max_file_chars(),
            max_changed_files: default_max_changed_files(),
            max_commits: default_max_commits(),
            max_comments_chars: default_max_comments_chars(),
            search_results: default_search_results(),
            file_commits_per_page: default_file_commits_per_page(),
        }
    }
}

impl SourceConfig {
    pub fn limits(&self) -> SourceLimits {
        SourceLimits {
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            per_page: self.per_page,
            max_pages: self.max_pages,
            max_diff_chars: self.max_diff_chars,
            max_file_chars: self.max_file_chars,
            max_changed_files: self.max_changed_files,
            max_commits: self.max_commits,
            max_comments_chars: self.max_comments_chars,
            search_results: self.search_results,
            file_commits_per_page: self.file_commits_per_page,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub assistant_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: None,
            user_prompt: None,
            assistant_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_concurrent_analyses")]
    pub max_concurrent_analyses: usize,
    /// Upper bound for one HTTP-triggered analysis, end to end.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

fn default_max_concurrent_analyses() -> usize {
    4
}

fn default_request_timeout_seconds() -> u64 {
    900
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_concurrent_analyses: default_max_concurrent_analyses(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl PerfsleuthConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg = Self::from_toml(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok((cfg, path))
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// `lookup` is `std::env::var` in production and a map in tests.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PERFSLEUTH_MODEL") {
            self.inference.model = v;
        }
        if let Some(v) = get("PERFSLEUTH_INFERENCE_ENDPOINT") {
            self.inference.endpoint = v;
        }
        if let Some(v) = get("PERFSLEUTH_INFERENCE_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.inference.api_key = Some(v);
        }
        if let Some(v) = get("GITHUB_TOKEN") {
            self.source.token = Some(v);
        }
        if let Some(v) = get("PERFSLEUTH_MAX_ITERATIONS") {
            match v.trim().parse::<u32>() {
                Ok(n) => self.agent.max_iterations = n,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring invalid PERFSLEUTH_MAX_ITERATIONS"),
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inference.model.trim().is_empty() {
            return Err(anyhow::anyhow!("inference.model is required"));
        }
        if self.inference.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("inference.endpoint is required"));
        }
        if self.inference.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("inference.request_timeout_seconds must be > 0"));
        }
        if self.source.api_base.trim().is_empty() {
            return Err(anyhow::anyhow!("source.api_base is required"));
        }
        let positive = [
            ("source.request_timeout_seconds", self.source.request_timeout_seconds as u128),
            ("source.per_page", self.source.per_page as u128),
            ("source.max_pages", self.source.max_pages as u128),
            ("source.max_diff_chars", self.source.max_diff_chars as u128),
            ("source.max_file_chars", self.source.max_file_chars as u128),
            ("source.max_changed_files", self.source.max_changed_files as u128),
            ("source.max_commits", self.source.max_commits as u128),
            ("source.max_comments_chars", self.source.max_comments_chars as u128),
            ("source.search_results", self.source.search_results as u128),
            ("source.file_commits_per_page", self.source.file_commits_per_page as u128),
            ("agent.max_iterations", self.agent.max_iterations as u128),
            ("retry.max_attempts", self.retry.max_attempts as u128),
            ("server.max_concurrent_analyses", self.server.max_concurrent_analyses as u128),
            ("server.request_timeout_seconds", self.server.request_timeout_seconds as u128),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(anyhow::anyhow!("{key} must be > 0"));
            }
        }
        let char_budgets = [
            ("source.max_diff_chars", self.source.max_diff_chars),
            ("source.max_file_chars", self.source.max_file_chars),
            ("source.max_comments_chars", self.source.max_comments_chars),
        ];
        for (key, value) in char_budgets {
            if value < MIN_CHAR_BUDGET {
                return Err(anyhow::anyhow!("{key} must be >= {MIN_CHAR_BUDGET}"));
            }
        }
        if self.source.per_page > 100 {
            return Err(anyhow::anyhow!("source.per_page must be <= 100"));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(anyhow::anyhow!("retry.multiplier must be >= 1.0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(anyhow::anyhow!(
                "retry.max_delay_ms must be >= retry.base_delay_ms"
            ));
        }
        self.bind_addr()?;
        if self.source_token().is_none() {
            tracing::warn!(
                "source.token is not set; running unauthenticated with a much lower rate limit"
            );
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.server
            .bind
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("server.bind {:?} is not host:port: {e}", self.server.bind))
    }

    pub fn source_token(&self) -> Option<&str> {
        self.source
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn inference_api_key(&self) -> Option<&str> {
        self.inference
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".perfsleuth").join("config.toml")
}

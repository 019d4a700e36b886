//! Investigation queries against one change, rendered as bounded text for the model.

use crate::cache::{CacheKey, ChangedFilePages, InvestigationCache};
use crate::context::InvestigationContext;
use crate::error::{Result, ToolError};
use crate::github::{ChangedFile, Comment, CommitEntry, Contents, FileFetch, GithubClient};
use crate::safety::{annotate_if_test, filter_test_hunks, is_test_artifact};
use crate::traits::ToolOutput;
use crate::truncate::{truncate_text, truncate_with_prefix};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fmt::Write as _;
use std::sync::Arc;

pub const DEFAULT_REF: &str = "main";
pub const ONLY_TEST_CHANGES: &str =
    "No production code changes found (only test files were modified).";
const COMMIT_SUBJECT_MAX: usize = 100;
const SEARCH_TITLE_MAX: usize = 80;

/// All source queries for one investigation, sharing one client and one cache.
pub struct SourceApi {
    client: GithubClient,
    cache: Arc<InvestigationCache>,
    ctx: Arc<InvestigationContext>,
}

impl SourceApi {
    pub fn new(
        client: GithubClient,
        cache: Arc<InvestigationCache>,
        ctx: Arc<InvestigationContext>,
    ) -> Self {
        Self { client, cache, ctx }
    }

    pub fn context(&self) -> &InvestigationContext {
        &self.ctx
    }

    async fn changed_file_pages(&self) -> Result<ChangedFilePages> {
        let key = CacheKey::for_context(&self.ctx);
        self.cache
            .get_or_fetch(&key, || self.client.changed_files(&self.ctx))
            .await
    }

    /// Production files in the change, largest first, optionally under `path_prefix`.
    pub async fn changed_files(&self, path_prefix: Option<&str>) -> Result<ToolOutput> {
        let pages = self.changed_file_pages().await?;
        let total = pages.items.len();
        let prefix = path_prefix.map(|p| p.trim_start_matches('/'));

        let mut production: Vec<&ChangedFile> = pages
            .items
            .iter()
            .filter(|f| !is_test_artifact(&f.filename))
            .filter(|f| prefix.is_none_or(|p| f.filename.starts_with(p)))
            .collect();
        let excluded_tests = pages
            .items
            .iter()
            .filter(|f| is_test_artifact(&f.filename))
            .count();
        production.sort_by(|a, b| {
            b.magnitude()
                .cmp(&a.magnitude())
                .then_with(|| a.filename.cmp(&b.filename))
        });

        let mut out = format!("Production files changed: {} (of {total} total", production.len());
        if let Some(p) = prefix {
            let _ = write!(out, ", matching prefix '{p}'");
        }
        out.push_str(")\n");
        if excluded_tests > 0 {
            let _ = writeln!(
                out,
                "({excluded_tests} test files excluded; they do not affect runtime performance)"
            );
        }
        out.push('\n');

        let cap = self.client.limits().max_changed_files;
        for file in production.iter().take(cap) {
            let _ = writeln!(
                out,
                "  {:<10} +{:<6} -{:<6} {}",
                file.status, file.additions, file.deletions, file.filename
            );
        }
        let mut truncated = pages.more_available;
        if production.len() > cap {
            truncated = true;
            let _ = writeln!(out, "\n... and {} more production files", production.len() - cap);
        }
        if let Some(note) = pages.more_results_note() {
            let _ = writeln!(out, "\n{note}");
        }
        Ok(ToolOutput::text(out.trim_end()).with_truncated(truncated))
    }

    /// The whole unified diff with test-file sections removed.
    pub async fn change_diff(&self) -> Result<ToolOutput> {
        let raw = self.client.change_diff(&self.ctx).await?;
        let filtered = filter_test_hunks(&raw);
        if filtered.text.trim().is_empty() {
            return Ok(ToolOutput::text(ONLY_TEST_CHANGES));
        }
        if filtered.skipped_files > 0 {
            tracing::debug!(skipped = filtered.skipped_files, "stripped test files from diff");
        }
        let (text, truncated) = truncate_text(&filtered.text, self.client.limits().max_diff_chars);
        Ok(ToolOutput::text(text).with_truncated(truncated))
    }

    /// The patch of one changed file. Test files are served but flagged.
    pub async fn file_diff(&self, file_path: &str) -> Result<ToolOutput> {
        let path = normalize_repo_path(file_path)?;
        let pages = self.changed_file_pages().await?;
        let Some(file) = pages.items.iter().find(|f| f.filename == path) else {
            return Ok(ToolOutput::text(format!(
                "File '{path}' is not among the files changed by {}. \
                 Use get_pr_changed_files to see the exact paths.",
                self.ctx.label()
            )));
        };
        let Some(patch) = file.patch.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(ToolOutput::text(format!(
                "No diff available for '{path}' (+{} -{}); it is binary or too large for the API. \
                 Use get_file_content to read it.",
                file.additions, file.deletions
            )));
        };
        let header = annotate_if_test(&path, format!("--- {path} ({})\n", file.status));
        let (text, truncated) =
            truncate_with_prefix(&header, patch, self.client.limits().max_diff_chars);
        Ok(ToolOutput::text(text).with_truncated(truncated))
    }

    pub async fn description(&self) -> Result<ToolOutput> {
        let pr = self.client.pull_request(&self.ctx).await?;
        let mut out = format!("Title: {}\n", pr.title);
        if !pr.labels.is_empty() {
            let labels: Vec<&str> = pr.labels.iter().map(|l| l.name.as_str()).collect();
            let _ = writeln!(out, "Labels: {}", labels.join(", "));
        }
        let body = pr.body.as_deref().map(str::trim).unwrap_or_default();
        if body.is_empty() {
            out.push_str("\n(no description provided)");
        } else {
            let _ = write!(out, "\n{body}");
        }
        let (text, truncated) = truncate_text(&out, self.client.limits().max_file_chars);
        Ok(ToolOutput::text(text).with_truncated(truncated))
    }

    pub async fn file_content(&self, file_path: &str, git_ref: Option<&str>) -> Result<ToolOutput> {
        let path = normalize_repo_path(file_path)?;
        let git_ref = git_ref.unwrap_or(DEFAULT_REF);
        let entry = match self.client.contents(&self.ctx, &path, git_ref).await? {
            FileFetch::TooLarge => {
                return Ok(ToolOutput::text(format!(
                    "File '{path}' at {git_ref} is too large to fetch (over 1MB). \
                     Use get_file_diff to see what changed in it."
                )));
            }
            FileFetch::Found(Contents::Directory(_)) => {
                return Ok(ToolOutput::text(format!(
                    "'{path}' is a directory. Use list_repo_directory to browse it."
                )));
            }
            FileFetch::Found(Contents::File(entry)) => entry,
        };
        if entry.kind != "file" {
            return Ok(ToolOutput::text(format!(
                "'{path}' is a {} and has no readable content.",
                entry.kind
            )));
        }
        let encoded = entry.content.unwrap_or_default();
        if entry.encoding.as_deref().is_some_and(|e| e != "base64") {
            return Err(ToolError::ExecutionFailed(format!(
                "unsupported content encoding for '{path}'"
            )));
        }
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| ToolError::ExecutionFailed(format!("decode '{path}': {e}")))?;
        let Ok(source) = String::from_utf8(bytes) else {
            return Err(ToolError::ExecutionFailed(format!(
                "'{path}' is not valid UTF-8 text (binary file?)"
            )));
        };
        let header = annotate_if_test(&path, format!("=== {path} @ {git_ref} ===\n"));
        let (text, truncated) =
            truncate_with_prefix(&header, &source, self.client.limits().max_file_chars);
        Ok(ToolOutput::text(text).with_truncated(truncated))
    }

    /// Commits in the change, or the history of one file up to the change head.
    pub async fn commits(&self, file_path: Option<&str>) -> Result<ToolOutput> {
        let Some(file_path) = file_path else {
            let paged = self.client.change_commits(&self.ctx).await?;
            let cap = self.client.limits().max_commits;
            let shown = paged.items.len().min(cap);
            let mut out = format!(
                "Commits in {} ({} total, showing {shown}):\n",
                self.ctx.label(),
                paged.items.len()
            );
            for commit in paged.items.iter().take(cap) {
                out.push_str(&format_commit(commit));
            }
            let truncated = paged.more_available || paged.items.len() > cap;
            if let Some(note) = paged.more_results_note() {
                let _ = write!(out, "\n{note}");
            }
            return Ok(ToolOutput::text(out.trim_end()).with_truncated(truncated));
        };

        let path = normalize_repo_path(file_path)?;
        let head = self.client.pull_request(&self.ctx).await?.head.sha;
        let paged = self.client.commits_touching(&self.ctx, &head, &path).await?;
        if paged.items.is_empty() {
            return Ok(ToolOutput::text(format!("No commits found touching '{path}'.")));
        }
        let mut out = format!(
            "Recent commits touching '{path}' (up to the head of {}; \
             may include commits from before this change):\n",
            self.ctx.label()
        );
        for commit in &paged.items {
            out.push_str(&format_commit(commit));
        }
        if let Some(note) = paged.more_results_note() {
            let _ = write!(out, "\n{note}");
        }
        Ok(ToolOutput::text(out.trim_end()).with_truncated(paged.more_available))
    }

    /// Review and discussion comments, newest first.
    pub async fn comments(&self) -> Result<ToolOutput> {
        let review = self.client.review_comments(&self.ctx).await;
        let discussion = self.client.discussion_comments(&self.ctx).await;
        let rate_limited = [&review, &discussion]
            .into_iter()
            .any(|r| matches!(r, Err(ToolError::RateLimited(_))));
        let mut notes = Vec::new();
        let mut all: Vec<(&'static str, Comment)> = Vec::new();
        match (review, discussion) {
            (Err(first), Err(second)) => {
                return Err(match second {
                    ToolError::RateLimited(_) => second,
                    _ => first,
                });
            }
            (review, discussion) => {
                for (kind, result) in [("review", review), ("discussion", discussion)] {
                    match result {
                        Ok(comments) => all.extend(comments.into_iter().map(|c| (kind, c))),
                        Err(e) => {
                            tracing::warn!(kind, error = %e, "comment fetch failed");
                            notes.push(format!("({kind} comments unavailable: {e})"));
                        }
                    }
                }
            }
        }
        if all.is_empty() && notes.is_empty() {
            return Ok(ToolOutput::text("No comments on this change."));
        }
        // ISO-8601 timestamps sort lexicographically.
        all.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));

        let mut out = format!("Comments ({}):\n", all.len());
        for note in &notes {
            let _ = writeln!(out, "{note}");
        }
        for (kind, comment) in &all {
            let author = comment.user.as_ref().map_or("unknown", |u| u.login.as_str());
            let date = comment.created_at.get(..10).unwrap_or(&comment.created_at);
            let _ = write!(out, "\n[{kind}] {author} on {date}");
            if let Some(path) = &comment.path {
                let _ = write!(out, " ({path})");
            }
            let _ = writeln!(out, ":\n{}", comment.body.trim());
        }
        let (text, truncated) = truncate_text(out.trim_end(), self.client.limits().max_comments_chars);
        Ok(ToolOutput::text(text)
            .with_truncated(truncated)
            .with_rate_limited(rate_limited))
    }

    pub async fn directory(&self, path: Option<&str>, git_ref: Option<&str>) -> Result<ToolOutput> {
        let path = match path {
            Some(p) => normalize_dir_path(p)?,
            None => String::new(),
        };
        let git_ref = git_ref.unwrap_or(DEFAULT_REF);
        let shown = if path.is_empty() { "/" } else { path.as_str() };
        let mut entries = match self.client.contents(&self.ctx, &path, git_ref).await? {
            FileFetch::Found(Contents::Directory(entries)) => entries,
            FileFetch::Found(Contents::File(_)) | FileFetch::TooLarge => {
                return Ok(ToolOutput::text(format!(
                    "'{shown}' is a file, not a directory. Use get_file_content to read it."
                )));
            }
        };
        entries.sort_by(|a, b| {
            (a.kind != "dir")
                .cmp(&(b.kind != "dir"))
                .then_with(|| a.name.cmp(&b.name))
        });
        let mut out = format!("Contents of {shown} @ {git_ref} ({} entries):\n", entries.len());
        for entry in &entries {
            if entry.kind == "dir" {
                let _ = writeln!(out, "  {}/", entry.name);
            } else {
                let _ = writeln!(out, "  {}  ({} bytes)", entry.name, entry.size);
            }
        }
        Ok(ToolOutput::text(out.trim_end()))
    }

    pub async fn search(&self, query: &str) -> Result<ToolOutput> {
        let results = self.client.search_changes(&self.ctx, query).await?;
        if results.items.is_empty() {
            return Ok(ToolOutput::text(format!("No changes found matching '{query}'.")));
        }
        let mut out = format!(
            "Changes matching '{query}' ({} total, showing {}):\n",
            results.total_count,
            results.items.len()
        );
        for item in &results.items {
            let date = item.created_at.get(..10).unwrap_or(&item.created_at);
            let title = clip_chars(&item.title, SEARCH_TITLE_MAX);
            let _ = writeln!(out, "  #{}  [{}]  {date}  {title}", item.number, item.state);
        }
        Ok(ToolOutput::text(out.trim_end()))
    }
}

fn format_commit(commit: &CommitEntry) -> String {
    let sha = commit.sha.get(..7).unwrap_or(&commit.sha);
    let (author, date) = commit
        .commit
        .author
        .as_ref()
        .map_or(("unknown", ""), |a| (a.name.as_str(), a.date.get(..10).unwrap_or(&a.date)));
    let subject = commit.commit.message.lines().next().unwrap_or_default();
    format!(
        "  {sha}  {date}  {author}  {}\n",
        clip_chars(subject, COMMIT_SUBJECT_MAX)
    )
}

fn clip_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Repository-relative file path; rejects traversal and empty paths.
fn normalize_repo_path(path: &str) -> Result<String> {
    let path = normalize_dir_path(path)?;
    if path.is_empty() {
        return Err(ToolError::InvalidArguments("file path is empty".to_string()));
    }
    Ok(path)
}

fn normalize_dir_path(path: &str) -> Result<String> {
    let path = path.trim().trim_matches('/');
    if path.contains('\0') || path.contains('?') || path.contains('#') {
        return Err(ToolError::InvalidArguments(format!(
            "malformed path: {path:?}"
        )));
    }
    if path.split('/').any(|seg| seg == ".." || seg == "." || (seg.is_empty() && !path.is_empty())) {
        return Err(ToolError::InvalidArguments(format!(
            "path must be repository-relative without '.' or '..' segments: {path:?}"
        )));
    }
    Ok(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionId;
    use crate::github::SourceLimits;
    use crate::safety::TEST_FILE_WARNING;
    use crate::truncate::truncation_marker;
    use httpmock::prelude::*;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn api(server: &MockServer, limits: SourceLimits) -> SourceApi {
        let ctx = Arc::new(InvestigationContext::new(
            "acme",
            "engine",
            42,
            Some("tok".to_string()),
            SessionId::new(),
        ));
        let client = GithubClient::new(&server.base_url(), ctx.credential(), limits)
            .expect("client");
        SourceApi::new(client, Arc::new(InvestigationCache::new()), ctx)
    }

    fn limits() -> SourceLimits {
        SourceLimits {
            request_timeout: Duration::from_secs(5),
            ..SourceLimits::default()
        }
    }

    fn file(name: &str, additions: u64) -> Value {
        json!({
            "filename": name,
            "status": "modified",
            "additions": additions,
            "deletions": 1,
            "patch": format!("@@ -1 +1 @@\n-old\n+new {name}")
        })
    }

    fn entry_lines(text: &str) -> Vec<&str> {
        text.lines().filter(|l| l.starts_with("  ")).collect()
    }

    #[tokio::test]
    async fn listing_excludes_test_files_and_sorts_by_magnitude() {
        let server = MockServer::start();
        let mut files: Vec<Value> = (0..45).map(|i| file(&format!("src/m{i:02}.go"), i)).collect();
        files.extend((0..12).map(|i| file(&format!("pkg/tests/t{i}.go"), 500)));
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/engine/pulls/42/files")
                .query_param("page", "1");
            then.status(200).json_body(Value::Array(files));
        });

        let out = api(&server, limits())
            .changed_files(None)
            .await
            .expect("listing");

        assert!(out.text.starts_with("Production files changed: 45 (of 57 total)"));
        assert!(out.text.contains("12 test files excluded"));
        let lines = entry_lines(&out.text);
        assert_eq!(lines.len(), 45);
        assert!(lines.iter().all(|l| !l.contains("/tests/")));
        assert!(lines[0].ends_with("src/m44.go"));
        assert!(lines[44].ends_with("src/m00.go"));
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn listing_is_served_from_cache_and_respects_prefix() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/files");
            then.status(200).json_body(json!([
                file("src/db/pool.go", 10),
                file("src/http/server.go", 3),
            ]));
        });
        let api = api(&server, limits());

        let all = api.changed_files(None).await.expect("first");
        let scoped = api.changed_files(Some("src/db")).await.expect("second");

        assert_eq!(mock.calls(), 1);
        assert_eq!(entry_lines(&all.text).len(), 2);
        assert!(scoped.text.contains("matching prefix 'src/db'"));
        assert_eq!(entry_lines(&scoped.text).len(), 1);
    }

    #[tokio::test]
    async fn listing_over_cap_reports_remainder_and_ceiling() {
        let server = MockServer::start();
        let page: Vec<Value> = (0..3).map(|i| file(&format!("src/f{i}.rs"), i)).collect();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/files");
            then.status(200).json_body(Value::Array(page));
        });
        let api = api(
            &server,
            SourceLimits {
                per_page: 3,
                max_pages: 2,
                max_changed_files: 4,
                ..limits()
            },
        );

        let out = api.changed_files(None).await.expect("listing");

        assert_eq!(mock.calls(), 2);
        assert_eq!(entry_lines(&out.text).len(), 4);
        assert!(out.text.contains("... and 2 more production files"));
        assert!(out.text.contains("more results exist (stopped after 2 pages, 6 items)"));
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn diff_drops_test_sections_and_caps_size() {
        let server = MockServer::start();
        let big_body: String = (0..2_000).map(|i| format!("+line {i}\n")).collect();
        let diff = format!(
            "diff --git a/src/engine.go b/src/engine.go\n--- a/src/engine.go\n+++ b/src/engine.go\n@@ -1 +1,2000 @@\n{big_body}\
             diff --git a/src/engine_test.go b/src/engine_test.go\n--- a/src/engine_test.go\n+++ b/src/engine_test.go\n@@ -1 +1 @@\n+TEST_ONLY_MARKER\n\
             diff --git a/e2e/load.js b/e2e/load.js\n--- a/e2e/load.js\n+++ b/e2e/load.js\n@@ -1 +1 @@\n+E2E_ONLY_MARKER\n"
        );
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/engine/pulls/42")
                .header("accept", "application/vnd.github.v3.diff");
            then.status(200).body(diff);
        });
        let api = api(
            &server,
            SourceLimits {
                max_diff_chars: 1_000,
                ..limits()
            },
        );

        let out = api.change_diff().await.expect("diff");

        assert!(out.truncated);
        assert!(out.text.chars().count() <= 1_000);
        assert!(out.text.starts_with("diff --git a/src/engine.go"));
        assert!(!out.text.contains("TEST_ONLY_MARKER"));
        assert!(!out.text.contains("E2E_ONLY_MARKER"));
        assert!(out.text.contains("...truncated at "));
    }

    #[tokio::test]
    async fn diff_with_only_test_files_says_so() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42");
            then.status(200).body(
                "diff --git a/tests/a.py b/tests/a.py\n--- a/tests/a.py\n+++ b/tests/a.py\n@@ -1 +1 @@\n+x\n",
            );
        });

        let out = api(&server, limits()).change_diff().await.expect("diff");
        assert_eq!(out.text, ONLY_TEST_CHANGES);
    }

    #[tokio::test]
    async fn test_file_diff_is_served_with_warning() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/files");
            then.status(200).json_body(json!([
                file("src/engine.go", 3),
                file("src/engine_test.go", 2),
            ]));
        });
        let api = api(&server, limits());

        let flagged = api.file_diff("src/engine_test.go").await.expect("diff");
        assert!(flagged.text.starts_with(TEST_FILE_WARNING));
        assert!(flagged.text.contains("+new src/engine_test.go"));

        let plain = api.file_diff("/src/engine.go").await.expect("diff");
        assert!(!plain.text.contains(TEST_FILE_WARNING));

        let missing = api.file_diff("src/nope.go").await.expect("hint");
        assert!(missing.text.contains("get_pr_changed_files"));
    }

    #[tokio::test]
    async fn flagged_test_file_diff_stays_within_budget() {
        let server = MockServer::start();
        let patch = format!("@@ -1,400 +1,400 @@\n{}", "+sleep(10ms)\n".repeat(400));
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/files");
            then.status(200).json_body(json!([{
                "filename": "pkg/a_test.go",
                "status": "modified",
                "additions": 400,
                "deletions": 400,
                "patch": patch
            }]));
        });
        let cap = 400;
        let out = api(&server, SourceLimits { max_diff_chars: cap, ..limits() })
            .file_diff("pkg/a_test.go")
            .await
            .expect("diff");

        assert!(out.truncated);
        assert!(out.text.chars().count() <= cap, "{}", out.text.chars().count());
        assert!(out.text.starts_with(TEST_FILE_WARNING));
        assert!(out.text.contains("--- pkg/a_test.go (modified)"));
    }

    #[tokio::test]
    async fn file_content_decodes_and_caps() {
        let server = MockServer::start();
        let source = "fn main() {}\n".repeat(200);
        let encoded = BASE64.encode(source.as_bytes());
        // The API wraps base64 at 60 columns.
        let wrapped: String = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| format!("{}\n", String::from_utf8_lossy(c)))
            .collect();
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/engine/contents/src/main.rs")
                .query_param("ref", "v2");
            then.status(200).json_body(json!({
                "name": "main.rs",
                "path": "src/main.rs",
                "type": "file",
                "size": source.len(),
                "encoding": "base64",
                "content": wrapped
            }));
        });
        let api = api(
            &server,
            SourceLimits {
                max_file_chars: 500,
                ..limits()
            },
        );

        let out = api
            .file_content("src/main.rs", Some("v2"))
            .await
            .expect("content");
        assert!(out.truncated);
        assert!(out.text.chars().count() <= 500);
        assert!(out.text.starts_with("=== src/main.rs @ v2 ==="));
        assert!(out.text.contains("fn main() {}"));
        assert!(out.text.contains(&format!("(original size {})", source.len())));
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected_before_any_request() {
        let server = MockServer::start();
        let api = api(&server, limits());
        for bad in ["../secrets", "src/../../etc", "", "a//b"] {
            let err = api.file_content(bad, None).await.expect_err("rejected");
            assert!(matches!(err, ToolError::InvalidArguments(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn file_history_uses_head_sha_and_one_page() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42");
            then.status(200)
                .json_body(json!({"title": "t", "head": {"sha": "abc123def"}}));
        });
        let history = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/engine/commits")
                .query_param("sha", "abc123def")
                .query_param("path", "src/db/pool.go")
                .query_param("per_page", "20");
            then.status(200).json_body(json!([{
                "sha": "0123456789abcdef",
                "commit": {
                    "message": "Speed up pool checkout\n\nDetails follow",
                    "author": {"name": "dev", "date": "2024-03-01T10:00:00Z"}
                }
            }]));
        });

        let out = api(&server, limits())
            .commits(Some("src/db/pool.go"))
            .await
            .expect("history");

        history.assert();
        assert!(out.text.contains("may include commits from before this change"));
        assert!(out.text.contains("0123456  2024-03-01  dev  Speed up pool checkout"));
        assert!(!out.text.contains("Details follow"));
    }

    #[tokio::test]
    async fn comments_merge_newest_first_and_survive_one_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/comments");
            then.status(500).body("boom");
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/issues/42/comments");
            then.status(200).json_body(json!([
                {"user": {"login": "old"}, "body": "first", "created_at": "2024-01-01T00:00:00Z"},
                {"user": {"login": "new"}, "body": "second", "created_at": "2024-02-01T00:00:00Z"}
            ]));
        });

        let out = api(&server, limits()).comments().await.expect("comments");
        assert!(out.text.contains("review comments unavailable"));
        let newer = out.text.find("new on 2024-02-01").expect("newer");
        let older = out.text.find("old on 2024-01-01").expect("older");
        assert!(newer < older);
    }

    #[tokio::test]
    async fn partial_rate_limit_on_comments_is_flagged() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/comments");
            then.status(429).body("slow down");
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/issues/42/comments");
            then.status(200).json_body(json!([
                {"user": {"login": "dev"}, "body": "looks slow", "created_at": "2024-02-01T00:00:00Z"}
            ]));
        });

        let out = api(&server, limits()).comments().await.expect("comments");
        assert!(out.rate_limited);
        assert!(out.text.contains("review comments unavailable"));
        assert!(out.text.contains("looks slow"));
    }

    #[tokio::test]
    async fn both_comment_listings_failing_reports_the_rate_limit() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/pulls/42/comments");
            then.status(404).body("{\"message\":\"Not Found\"}");
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/engine/issues/42/comments");
            then.status(429).body("slow down");
        });

        let err = api(&server, limits()).comments().await.expect_err("both failed");
        assert!(matches!(err, ToolError::RateLimited(_)), "{err}");
    }

    #[tokio::test]
    async fn directory_lists_dirs_first() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/acme/engine/contents/src")
                .query_param("ref", "main");
            then.status(200).json_body(json!([
                {"name": "b.rs", "path": "src/b.rs", "type": "file", "size": 12},
                {"name": "zeta", "path": "src/zeta", "type": "dir", "size": 0},
                {"name": "a.rs", "path": "src/a.rs", "type": "file", "size": 7}
            ]));
        });

        let out = api(&server, limits())
            .directory(Some("src/"), None)
            .await
            .expect("listing");
        let lines = entry_lines(&out.text);
        assert_eq!(lines, vec!["  zeta/", "  a.rs  (7 bytes)", "  b.rs  (12 bytes)"]);
    }

    #[tokio::test]
    async fn search_scopes_query_to_repository() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "type:pr repo:acme/engine connection pool")
                .query_param("per_page", "5");
            then.status(200).json_body(json!({
                "total_count": 1,
                "items": [{"number": 7, "title": "Tune pool", "state": "closed", "created_at": "2023-12-24T00:00:00Z"}]
            }));
        });

        let out = api(&server, limits())
            .search("connection pool")
            .await
            .expect("search");
        mock.assert();
        assert!(out.text.contains("#7  [closed]  2023-12-24  Tune pool"));
    }

    #[test]
    fn marker_format_is_stable() {
        assert_eq!(
            truncation_marker(10, 20),
            "...truncated at 10 characters (original size 20)"
        );
    }
}

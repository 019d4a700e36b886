//! Transcript framing for an investigation.

use crate::target::ChangeRef;

const SYSTEM: &str = "You are a performance engineer investigating why a pull request may have \
caused a performance regression. Use the tools to inspect the change and explain the most likely \
cause.

Work as a funnel:
1. Call get_pr_changed_files first to see the scope of the change.
2. For small changes (under 30 files) read get_pr_diff. For larger ones, narrow with \
get_pr_changed_files(path_prefix) and read get_file_diff on the few most suspicious files.
3. Use get_pr_commits(file_path) to find which commit introduced a suspicious change.
4. Read get_pr_description before recommending anything so fixes preserve the change's intent.

Test and e2e files never affect runtime performance; never attribute a regression to them. \
Only name a root cause when a plausible mechanism links the changed code to the slowdown; \
otherwise say the cause is unclear.";

const USER: &str = "Investigate the performance impact of this pull request:
- Organization: {org}
- Repository: {repo}
- Pull request: #{number}
- URL: {url}

Report the likely root cause (files, functions, commits), its impact, and recommendations.";

const ASSISTANT: &str = "Understood. I will start with the changed-file overview, narrow to the \
suspect files, and base every conclusion on the code I retrieve.";

pub const BUDGET_EXHAUSTED: &str = "The investigation budget is used up. Without calling any \
more tools, give your best-effort conclusion from what you have gathered so far, and say \
clearly what remains unverified.";

pub const INCOMPLETE_NOTE: &str =
    "Note: the investigation hit its iteration limit; this conclusion is incomplete.";

pub const DEGRADED_NOTE: &str = "Note: the source API rate limit was reached during this \
investigation, so some code could not be inspected and the results may be incomplete.";

/// The three opening turns of every transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFrame {
    pub system: String,
    pub user: String,
    pub assistant: String,
}

impl PromptFrame {
    /// Overrides replace the defaults verbatim; `{org}`, `{repo}`, `{number}` and `{url}`
    /// are substituted in the user turn.
    pub fn for_change(
        change: &ChangeRef,
        system: Option<&str>,
        user: Option<&str>,
        assistant: Option<&str>,
    ) -> Self {
        let user = user
            .unwrap_or(USER)
            .replace("{org}", &change.org)
            .replace("{repo}", &change.repo)
            .replace("{number}", &change.number.to_string())
            .replace("{url}", &change.url());
        Self {
            system: system.unwrap_or(SYSTEM).to_string(),
            user,
            assistant: assistant.unwrap_or(ASSISTANT).to_string(),
        }
    }
}

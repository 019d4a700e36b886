//! Source-code investigation tools for PerfSleuth.
//!
//! Tools are bound to one [`InvestigationContext`] and invoked by the analysis loop.
//! Every result is size-capped text; test artifacts are kept out of the model's view.

mod cache;
mod context;
mod error;
mod github;
mod paginate;
mod registry;
mod safety;
mod source;
mod traits;
mod truncate;

pub use cache::{CacheKey, ChangedFilePages, InvestigationCache};
pub use context::{InvestigationContext, SessionId};
pub use error::{Result, ToolError};
pub use github::{ChangedFile, DEFAULT_API_BASE, GithubClient, SourceLimits};
pub use paginate::{PageLimits, Paged, paginate};
pub use registry::{InvestigationTool, ToolKind, ToolRegistry};
pub use safety::{FilteredDiff, TEST_FILE_WARNING, annotate_if_test, filter_test_hunks, is_test_artifact};
pub use source::{DEFAULT_REF, ONLY_TEST_CHANGES, SourceApi};
pub use traits::{Tool, ToolOutput, ToolSpec, to_llm_tool_def};
pub use truncate::{MIN_CHAR_BUDGET, truncate_text, truncate_with_prefix, truncation_marker};

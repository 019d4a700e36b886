//! Parsing the change an analysis is about.

use crate::error::AnalysisError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const NAME: &str = r"[A-Za-z0-9_.-]+";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRef {
    pub org: String,
    pub repo: String,
    pub number: u64,
}

impl ChangeRef {
    pub fn url(&self) -> String {
        format!(
            "https://github.com/{}/{}/pull/{}",
            self.org, self.repo, self.number
        )
    }
}

impl fmt::Display for ChangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.org, self.repo, self.number)
    }
}

/// Accepts `org/repo#123` and `https://github.com/org/repo/pull/123[/...]`.
impl FromStr for ChangeRef {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim().trim_matches(|c| c == '<' || c == '>');
        let short = Regex::new(&format!(r"^({NAME})/({NAME})#(\d+)$"))
            .map_err(|e| AnalysisError::InvalidTarget(e.to_string()))?;
        let url = Regex::new(&format!(
            r"^(?:https?://)?(?:www\.)?github\.com/({NAME})/({NAME})/pull/(\d+)(?:[/?#].*)?$"
        ))
        .map_err(|e| AnalysisError::InvalidTarget(e.to_string()))?;

        let Some(caps) = short.captures(input).or_else(|| url.captures(input)) else {
            return Err(AnalysisError::InvalidTarget(format!(
                "{input:?} (expected org/repo#123 or a pull request URL)"
            )));
        };
        let number: u64 = caps[3]
            .parse()
            .map_err(|e| AnalysisError::InvalidTarget(format!("{input:?}: {e}")))?;
        if number == 0 {
            return Err(AnalysisError::InvalidTarget(format!(
                "{input:?}: change number must be positive"
            )));
        }
        for name in [&caps[1], &caps[2]] {
            if matches!(name, "." | "..") {
                return Err(AnalysisError::InvalidTarget(format!(
                    "{input:?}: {name:?} is not an owner or repository name"
                )));
            }
        }
        Ok(Self {
            org: caps[1].to_string(),
            repo: caps[2].to_string(),
            number,
        })
    }
}

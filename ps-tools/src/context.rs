use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one analysis run; scopes every cache entry it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What one analysis investigates. Built once, never mutated.
#[derive(Clone)]
pub struct InvestigationContext {
    org: String,
    repo: String,
    change_number: u64,
    credential: Option<String>,
    session: SessionId,
}

impl InvestigationContext {
    pub fn new(
        org: impl Into<String>,
        repo: impl Into<String>,
        change_number: u64,
        credential: Option<String>,
        session: SessionId,
    ) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
            change_number,
            credential: credential
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            session,
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn change_number(&self) -> u64 {
        self.change_number
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// `org/repo#123`
    pub fn label(&self) -> String {
        format!("{}/{}#{}", self.org, self.repo, self.change_number)
    }
}

impl fmt::Debug for InvestigationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvestigationContext")
            .field("org", &self.org)
            .field("repo", &self.repo)
            .field("change_number", &self.change_number)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("session", &self.session)
            .finish()
    }
}

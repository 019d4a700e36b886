//! Per-analysis memoisation of the changed-files listing.
//!
//! Keys carry the session id, so two analyses of the same change never see each
//! other's pages even though they share one store.

use crate::context::{InvestigationContext, SessionId};
use crate::error::Result;
use crate::github::ChangedFile;
use crate::paginate::Paged;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub org: String,
    pub repo: String,
    pub change_number: u64,
    pub session: SessionId,
}

impl CacheKey {
    pub fn for_context(ctx: &InvestigationContext) -> Self {
        Self {
            org: ctx.org().to_string(),
            repo: ctx.repo().to_string(),
            change_number: ctx.change_number(),
            session: ctx.session(),
        }
    }
}

pub type ChangedFilePages = Arc<Paged<ChangedFile>>;

#[derive(Default)]
pub struct InvestigationCache {
    entries: DashMap<CacheKey, ChangedFilePages>,
}

impl InvestigationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored pages for `key`, or run `loader` and store its result.
    ///
    /// Loader failures are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, loader: F) -> Result<ChangedFilePages>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Paged<ChangedFile>>>,
    {
        if let Some(hit) = self.entries.get(key) {
            tracing::debug!(session = %key.session, change = key.change_number, "changed-files cache hit");
            return Ok(Arc::clone(hit.value()));
        }

        let pages = Arc::new(loader().await?);
        tracing::info!(
            session = %key.session,
            change = key.change_number,
            files = pages.items.len(),
            "cached changed files"
        );
        self.entries.insert(key.clone(), Arc::clone(&pages));
        Ok(pages)
    }

    /// Drop every entry belonging to `session`; other sessions are untouched.
    pub fn invalidate(&self, session: SessionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.session != session);
        let removed = before.saturating_sub(self.entries.len());
        tracing::debug!(%session, removed, "invalidated session cache");
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

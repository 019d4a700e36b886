//! The one pagination primitive every paginated source query goes through.

use crate::error::Result;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub per_page: u32,
    pub max_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub pages_fetched: u32,
    /// The page ceiling stopped us while the last page was still full.
    pub more_available: bool,
}

impl<T> Paged<T> {
    pub fn more_results_note(&self) -> Option<String> {
        self.more_available.then(|| {
            format!(
                "... more results exist (stopped after {} pages, {} items)",
                self.pages_fetched,
                self.items.len()
            )
        })
    }
}

/// Fetch pages `1..=max_pages` until one comes back short.
///
/// Never issues more than `limits.max_pages` requests.
pub async fn paginate<T, F, Fut>(limits: PageLimits, mut fetch_page: F) -> Result<Paged<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let per_page = limits.per_page.max(1) as usize;
    let max_pages = limits.max_pages.max(1);
    let mut items = Vec::new();
    let mut page = 1u32;

    loop {
        let batch = fetch_page(page).await?;
        let full = batch.len() >= per_page;
        items.extend(batch);

        if !full {
            return Ok(Paged {
                items,
                pages_fetched: page,
                more_available: false,
            });
        }
        if page >= max_pages {
            tracing::warn!(
                max_pages,
                items = items.len(),
                "pagination ceiling reached; results truncated"
            );
            return Ok(Paged {
                items,
                pages_fetched: page,
                more_available: true,
            });
        }
        page += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use std::cell::Cell;

    #[tokio::test]
    async fn stops_on_short_page() {
        let calls = Cell::new(0u32);
        let paged = paginate(
            PageLimits {
                per_page: 3,
                max_pages: 10,
            },
            |page| {
                calls.set(calls.get() + 1);
                async move {
                    Ok(match page {
                        1 => vec![1, 2, 3],
                        _ => vec![4],
                    })
                }
            },
        )
        .await
        .expect("paginate");
        assert_eq!(paged.items, vec![1, 2, 3, 4]);
        assert_eq!(paged.pages_fetched, 2);
        assert!(!paged.more_available);
        assert!(paged.more_results_note().is_none());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn never_exceeds_page_ceiling() {
        let calls = Cell::new(0u32);
        let paged = paginate(
            PageLimits {
                per_page: 2,
                max_pages: 4,
            },
            |page| {
                calls.set(calls.get() + 1);
                async move { Ok(vec![page, page]) }
            },
        )
        .await
        .expect("paginate");
        assert_eq!(calls.get(), 4);
        assert_eq!(paged.items.len(), 8);
        assert!(paged.more_available);
        let note = paged.more_results_note().expect("marker present");
        assert!(note.contains("more results exist"));
    }

    #[tokio::test]
    async fn propagates_page_errors() {
        let err = paginate::<u32, _, _>(
            PageLimits {
                per_page: 1,
                max_pages: 3,
            },
            |page| async move {
                if page == 2 {
                    return Err(ToolError::Transport("502".to_string()));
                }
                Ok(vec![page])
            },
        )
        .await
        .expect_err("second page fails");
        assert!(matches!(err, ToolError::Transport(_)));
    }
}

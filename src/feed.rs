//! Incremental "load more" over the post list
//!
//! A [`PostFeed`] owns the posts shown so far and the cursor of the next
//! page. Loading appends in API order, never de-duplicates, and refuses to
//! start while another load is in flight. A failed load leaves posts and
//! cursor untouched so the same page can be retried.

use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::content::{normalize_cursor, PostSummary, PostsPagination};
use crate::error::Error;
use crate::prismic::ContentSource;

/// Where the feed stands between user actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Loading,
    /// The last load failed; holds the reason shown next to the retry control
    Failed(String),
}

/// Why a load did not append anything
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no more pages")]
    Exhausted,
    #[error("a page is already loading")]
    Busy,
    #[error(transparent)]
    Fetch(#[from] Error),
}

#[derive(Debug)]
struct FeedInner {
    posts: Vec<PostSummary>,
    next_page: Option<String>,
    state: FeedState,
}

/// Posts loaded so far plus the cursor of the next page
#[derive(Debug)]
pub struct PostFeed {
    inner: Mutex<FeedInner>,
}

impl PostFeed {
    /// Start from the first page fetched at build time
    pub fn new(pagination: PostsPagination) -> Self {
        Self {
            inner: Mutex::new(FeedInner {
                posts: pagination.results,
                next_page: normalize_cursor(pagination.next_page),
                state: FeedState::Idle,
            }),
        }
    }

    /// Resume from a cursor alone, with no posts loaded yet
    pub fn from_cursor(cursor: impl Into<String>) -> Self {
        Self::new(PostsPagination {
            next_page: Some(cursor.into()),
            results: Vec::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn posts(&self) -> Vec<PostSummary> {
        self.lock().posts.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().posts.is_empty()
    }

    pub fn next_page(&self) -> Option<String> {
        self.lock().next_page.clone()
    }

    pub fn state(&self) -> FeedState {
        self.lock().state.clone()
    }

    /// Whether the "load more" control should be offered
    pub fn has_more(&self) -> bool {
        self.lock().next_page.is_some()
    }

    /// Whether the control should currently accept a click
    pub fn can_load_more(&self) -> bool {
        let inner = self.lock();
        inner.next_page.is_some() && inner.state != FeedState::Loading
    }

    /// Fetch the next page and append it
    ///
    /// Returns how many posts were appended.
    pub async fn load_more(&self, source: &dyn ContentSource) -> Result<usize, FeedError> {
        let cursor = {
            let mut inner = self.lock();
            if inner.state == FeedState::Loading {
                return Err(FeedError::Busy);
            }
            let Some(cursor) = inner.next_page.clone() else {
                return Err(FeedError::Exhausted);
            };
            inner.state = FeedState::Loading;
            cursor
        };

        let result = source.fetch_page(&cursor).await;

        let mut inner = self.lock();
        match result {
            Ok(response) => {
                let page = PostsPagination::from_response(response);
                let added = page.results.len();
                inner.posts.extend(page.results);
                inner.next_page = page.next_page;
                inner.state = FeedState::Idle;
                tracing::debug!(added, has_more = inner.next_page.is_some(), "Loaded more posts");
                Ok(added)
            }
            Err(e) => {
                tracing::warn!("Loading more posts failed: {}", e);
                inner.state = FeedState::Failed(e.to_string());
                Err(FeedError::Fetch(e))
            }
        }
    }
}

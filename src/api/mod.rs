//! API clients and the source traits the player consumes

pub mod bluesky;

use anyhow::Result;

use crate::models::QueueItem;

/// One page of candidate items
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Items in source order
    pub items: Vec<QueueItem>,
    /// Continuation cursor (None when the source has no more pages)
    pub cursor: Option<String>,
}

impl Page {
    /// Build a page
    pub fn new(items: Vec<QueueItem>, cursor: Option<String>) -> Self {
        Self { items, cursor }
    }
}

/// Search result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchSort {
    /// Ranked by engagement
    #[default]
    Top,
    /// Newest first
    Latest,
}

impl SearchSort {
    /// Query parameter value
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Latest => "latest",
        }
    }
}

/// Paginated content sources
#[allow(async_fn_in_trait)]
pub trait ContentSource {
    /// Search posts
    async fn search_posts(
        &self,
        query: &str,
        sort: SearchSort,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page>;

    /// Personalized home timeline
    async fn timeline(&self, limit: usize, cursor: Option<&str>) -> Result<Page>;

    /// Algorithmic feed generator (first page only)
    async fn feed(&self, feed_uri: &str, limit: usize) -> Result<Page>;
}

/// Engagement actions invoked from the overlay
#[allow(async_fn_in_trait)]
pub trait EngagementApi {
    /// Like an item, returning the like record URI
    async fn like(&self, item: &QueueItem) -> Result<String>;

    /// Delete a like record
    async fn unlike(&self, like_uri: &str) -> Result<()>;

    /// Repost an item, returning the repost record URI
    async fn repost(&self, item: &QueueItem) -> Result<String>;

    /// Delete a repost record
    async fn unrepost(&self, repost_uri: &str) -> Result<()>;
}

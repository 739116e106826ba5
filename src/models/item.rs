//! Queue item model (a candidate video post)

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content labels that mark a post as adult/graphic content.
pub const ADULT_LABELS: &[&str] = &[
    "porn",
    "sexual",
    "nudity",
    "graphic-media",
    "gore",
    "suggestive",
    "adult-only",
    "corpse",
];

/// Reference to the playable media of a post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Adaptive-stream playlist URL (None when the post can't be resolved to media)
    pub stream_url: Option<String>,
    /// Poster/thumbnail URL
    pub thumbnail_url: Option<String>,
    /// Duration hint in seconds, when the source knows it
    pub duration_hint: Option<f64>,
}

impl MediaRef {
    /// Create a media reference for a stream URL
    pub fn stream(url: impl Into<String>) -> Self {
        Self {
            stream_url: Some(url.into()),
            thumbnail_url: None,
            duration_hint: None,
        }
    }

    /// Whether this reference points at something that could be loaded at all
    pub fn is_resolvable(&self) -> bool {
        self.stream_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Snapshot of engagement counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    /// Number of likes
    pub likes: u32,
    /// Number of reposts
    pub reposts: u32,
}

impl Engagement {
    /// Create a new engagement snapshot
    pub const fn new(likes: u32, reposts: u32) -> Self {
        Self { likes, reposts }
    }

    /// Likes plus reposts
    pub const fn total(&self) -> u64 {
        self.likes as u64 + self.reposts as u64
    }

    /// How much the total grew since `earlier` (0 if it shrank)
    pub const fn growth_since(&self, earlier: &Self) -> u64 {
        self.total().saturating_sub(earlier.total())
    }
}

/// A candidate video post, immutable once queued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Stable dedup key (the post's at:// URI)
    pub id: String,
    /// Record CID (needed for likes/reposts)
    pub cid: Option<String>,
    /// Author DID
    pub author_id: String,
    /// Author handle
    pub author_handle: String,
    /// Author display name
    pub author_display_name: String,
    /// Author avatar URL
    pub author_avatar_url: Option<String>,
    /// Post text
    pub text: String,
    /// When the post was created
    pub created_at: DateTime<Utc>,
    /// Likes at fetch time
    pub like_count: u32,
    /// Reposts at fetch time
    pub repost_count: u32,
    /// Content labels on the post and its author
    pub labels: BTreeSet<String>,
    /// Playable media
    pub media: MediaRef,
}

impl QueueItem {
    /// Create an item with the given id and media, everything else empty
    pub fn new(id: impl Into<String>, media: MediaRef) -> Self {
        Self {
            id: id.into(),
            cid: None,
            author_id: String::new(),
            author_handle: String::new(),
            author_display_name: String::new(),
            author_avatar_url: None,
            text: String::new(),
            created_at: Utc::now(),
            like_count: 0,
            repost_count: 0,
            labels: BTreeSet::new(),
            media,
        }
    }

    /// Engagement snapshot taken when the item was fetched
    pub const fn engagement(&self) -> Engagement {
        Engagement::new(self.like_count, self.repost_count)
    }

    /// Whether any label is in the adult content set
    pub fn has_adult_label(&self) -> bool {
        self.labels
            .iter()
            .any(|label| ADULT_LABELS.contains(&label.as_str()))
    }

    /// Name to show in the overlay
    pub fn author_name(&self) -> &str {
        if self.author_display_name.is_empty() {
            &self.author_handle
        } else {
            &self.author_display_name
        }
    }

    /// Record key (last path segment of the at:// URI)
    pub fn rkey(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }

    /// Web URL of the post thread
    pub fn thread_url(&self) -> String {
        format!(
            "https://bsky.app/profile/{}/post/{}",
            self.author_handle,
            self.rkey()
        )
    }

    /// Web URL of the author's profile
    pub fn profile_url(&self) -> String {
        format!("https://bsky.app/profile/{}", self.author_handle)
    }

    /// Get relative time string (e.g., "5m", "2h", "3d")
    pub fn relative_time(&self) -> String {
        let duration = Utc::now().signed_duration_since(self.created_at);

        if duration.num_seconds() < 60 {
            format!("{}s", duration.num_seconds().max(0))
        } else if duration.num_minutes() < 60 {
            format!("{}m", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h", duration.num_hours())
        } else if duration.num_days() < 7 {
            format!("{}d", duration.num_days())
        } else {
            self.created_at.format("%b %d").to_string()
        }
    }
}

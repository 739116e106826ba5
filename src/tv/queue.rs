//! Append-only playback queue with per-source pagination cursors

use std::collections::{HashMap, HashSet};

use crate::models::QueueItem;

/// Upstream sources the aggregator pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Personalized home timeline (paginated)
    Timeline,
    /// Algorithmic discover feed (first page only)
    Discover,
    /// Exact hashtag search (always re-run from the start)
    TagSearch,
    /// Free-text search (paginated)
    TextSearch,
}

impl SourceKind {
    /// Display name for logs
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Timeline => "timeline",
            Self::Discover => "discover",
            Self::TagSearch => "tag search",
            Self::TextSearch => "text search",
        }
    }

    /// Whether this source continues from a cursor
    pub const fn is_paginated(&self) -> bool {
        matches!(self, Self::Timeline | Self::TextSearch)
    }
}

/// Ordered, duplicate-free sequence of queued items.
///
/// Items are only ever appended; navigation keeps an index into the queue.
#[derive(Debug, Default)]
pub struct Queue {
    items: Vec<QueueItem>,
    ids: HashSet<String>,
    cursors: HashMap<SourceKind, String>,
}

impl Queue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item; returns false (and drops it) if the id is already queued
    pub fn push(&mut self, item: QueueItem) -> bool {
        if !self.ids.insert(item.id.clone()) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Whether an id is queued
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Item at `index`
    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    /// Number of queued items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items after `index` that haven't been played yet
    pub fn remaining_after(&self, index: usize) -> usize {
        self.items.len().saturating_sub(index + 1)
    }

    /// Iterate in queue order
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Continuation cursor for a source
    pub fn cursor(&self, source: SourceKind) -> Option<&str> {
        self.cursors.get(&source).map(String::as_str)
    }

    /// Store (or reset, with None) the cursor for a source
    pub fn set_cursor(&mut self, source: SourceKind, cursor: Option<String>) {
        match cursor {
            Some(cursor) if source.is_paginated() => {
                self.cursors.insert(source, cursor);
            }
            _ => {
                self.cursors.remove(&source);
            }
        }
    }

    /// Drop all items and cursors
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
        self.cursors.clear();
    }
}

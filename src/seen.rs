//! Bounded, persisted set of already-shown item ids.
//!
//! Two instances exist: the TV player's (capacity 1000, plain dedup) and the
//! main feed's (capacity 5000, with resurfacing). Eviction is FIFO by
//! insertion order; viewing an item again does not refresh its position.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SeenLoadError, StoreError};
use crate::models::Engagement;
use crate::storage::{FEED_SEEN_KEY, KeyValueStore, TV_SEEN_KEY};

/// Engagement growth (likes + reposts) that makes a seen item show again
pub const RESURFACE_THRESHOLD: u64 = 50;

/// Configuration of one seen-set instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenConfig {
    /// Storage key
    pub key: String,
    /// Maximum number of entries
    pub capacity: usize,
    /// Growth needed to resurface a seen item (None disables resurfacing)
    pub resurface_threshold: Option<u64>,
}

impl SeenConfig {
    /// The TV player's instance
    pub fn tv(capacity: usize) -> Self {
        Self {
            key: TV_SEEN_KEY.to_string(),
            capacity,
            resurface_threshold: None,
        }
    }

    /// The main feed's instance
    pub fn feed(capacity: usize) -> Self {
        Self {
            key: FEED_SEEN_KEY.to_string(),
            capacity,
            resurface_threshold: Some(RESURFACE_THRESHOLD),
        }
    }
}

/// A persisted entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenEntry {
    /// Item id
    pub id: String,
    /// When it was marked
    pub seen_at: DateTime<Utc>,
    /// Engagement at mark time
    #[serde(default)]
    pub engagement: Option<Engagement>,
}

/// Bounded seen-set backed by a key-value store
pub struct SeenStore<K: KeyValueStore> {
    store: K,
    config: SeenConfig,
    order: VecDeque<String>,
    entries: HashMap<String, SeenEntry>,
}

impl<K: KeyValueStore> SeenStore<K> {
    /// Open the set, starting empty if the payload is missing or corrupt
    pub fn open(store: K, config: SeenConfig) -> Self {
        let entries = match Self::load(&store, &config.key) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Starting with an empty seen-set: {e}");
                Vec::new()
            }
        };

        let mut seen = Self {
            store,
            config,
            order: VecDeque::new(),
            entries: HashMap::new(),
        };
        for entry in entries {
            if !seen.entries.contains_key(&entry.id) {
                seen.order.push_back(entry.id.clone());
                seen.entries.insert(entry.id.clone(), entry);
            }
        }
        // Capacity may have been lowered since the payload was written
        while seen.order.len() > seen.config.capacity {
            seen.evict_oldest();
        }

        tracing::debug!(
            "Loaded seen-set `{}` with {} entries",
            seen.config.key,
            seen.order.len()
        );
        seen
    }

    /// Read and parse the persisted payload (oldest first)
    pub fn load(store: &K, key: &str) -> Result<Vec<SeenEntry>, SeenLoadError> {
        let Some(payload) = store.get(key)? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&payload).map_err(|source| SeenLoadError::Corrupt {
            key: key.to_string(),
            source,
        })
    }

    /// Whether `id` is in the set
    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Whether `id` should be treated as seen given its current engagement.
    ///
    /// With resurfacing enabled, an item whose likes + reposts grew by at
    /// least the threshold since it was marked counts as unseen.
    pub fn is_seen(&self, id: &str, current: Engagement) -> bool {
        let Some(entry) = self.entries.get(id) else {
            return false;
        };
        match (self.config.resurface_threshold, entry.engagement) {
            (Some(threshold), Some(snapshot)) => current.growth_since(&snapshot) < threshold,
            _ => true,
        }
    }

    /// Record `id` as seen. Returns false if it was already present.
    pub fn mark_seen(&mut self, id: &str, engagement: Option<Engagement>) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        if self.config.capacity == 0 {
            return false;
        }

        while self.order.len() >= self.config.capacity {
            self.evict_oldest();
        }
        self.order.push_back(id.to_string());
        self.entries.insert(
            id.to_string(),
            SeenEntry {
                id: id.to_string(),
                seen_at: Utc::now(),
                engagement,
            },
        );

        self.persist_or_warn();
        true
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.persist_or_warn();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Instance configuration
    pub const fn config(&self) -> &SeenConfig {
        &self.config
    }

    /// Oldest entry, if any
    pub fn oldest(&self) -> Option<&SeenEntry> {
        self.order.front().and_then(|id| self.entries.get(id))
    }

    /// Write the whole set to the store
    pub fn persist(&self) -> Result<(), StoreError> {
        let entries: Vec<&SeenEntry> = self
            .order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect();
        let payload = serde_json::to_string(&entries)?;
        self.store.set(&self.config.key, &payload)
    }

    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!("Failed to persist seen-set `{}`: {e}", self.config.key);
        }
    }

    fn evict_oldest(&mut self) {
        if let Some(id) = self.order.pop_front() {
            self.entries.remove(&id);
        }
    }
}

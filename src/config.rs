//! Configuration module for Perch TV

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::api::bluesky::{DEFAULT_PDS_URL, DISCOVER_FEED_URI};
use crate::paths;
use crate::tv::TvSettings;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bluesky handle to log in with
    #[serde(default)]
    pub handle: String,

    /// PDS URL
    #[serde(default = "default_pds_url")]
    pub pds_url: String,

    /// Number of posts to request per source call
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Algorithmic feed used alongside the timeline when no topic is set
    #[serde(default = "default_discover_feed")]
    pub discover_feed: String,

    /// Show posts carrying adult content labels
    #[serde(default)]
    pub allow_adult_content: bool,

    /// Fetch more when fewer than this many unplayed items remain
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,

    /// Clips shorter than this (seconds) are skipped
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: f64,

    /// Slide transition duration in milliseconds
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,

    /// Capacity of the TV seen-set
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    /// Capacity of the main feed seen-set
    #[serde(default = "default_feed_seen_capacity")]
    pub feed_seen_capacity: usize,
}

fn default_pds_url() -> String {
    DEFAULT_PDS_URL.to_string()
}

fn default_page_size() -> usize {
    25
}

fn default_discover_feed() -> String {
    DISCOVER_FEED_URI.to_string()
}

fn default_low_watermark() -> usize {
    5
}

fn default_min_duration_secs() -> f64 {
    5.0
}

fn default_transition_ms() -> u64 {
    320
}

fn default_seen_capacity() -> usize {
    1000
}

fn default_feed_seen_capacity() -> usize {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handle: String::new(),
            pds_url: default_pds_url(),
            page_size: default_page_size(),
            discover_feed: default_discover_feed(),
            allow_adult_content: false,
            low_watermark: default_low_watermark(),
            min_duration_secs: default_min_duration_secs(),
            transition_ms: default_transition_ms(),
            seen_capacity: default_seen_capacity(),
            feed_seen_capacity: default_feed_seen_capacity(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Player settings derived from this config
    pub fn tv_settings(&self) -> TvSettings {
        TvSettings {
            page_size: self.page_size.max(1),
            discover_feed: self.discover_feed.clone(),
            allow_adult_content: self.allow_adult_content,
            low_watermark: self.low_watermark,
            min_duration_secs: self.min_duration_secs,
            transition: Duration::from_millis(self.transition_ms),
        }
    }
}

//! # Perch TV 📺
//!
//! A continuous short-video player for Bluesky, in the terminal.
//!
//! ## Overview
//!
//! Perch TV pulls video posts from your timeline, a discovery feed or a topic
//! search, queues them, and plays them back to back. Two media slots alternate
//! so the next clip is already buffered when you move on; a slide transition
//! hands playback from one slot to the other.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Driver                              │
//! │  Owns the event channel, spawns fetches and timers          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │     Player      │ │   Aggregator    │ │    Presenter    │
//! │                 │ │                 │ │                 │
//! │ • Session state │ │ • Timeline      │ │ • Overlay       │
//! │ • Navigation    │ │ • Discover feed │ │ • Status line   │
//! │ • Transitions   │ │ • Topic search  │ │ • Open links    │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!          │                   │
//!          ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │   Media slots   │ │      Queue      │ │    Seen set     │
//! │                 │ │                 │ │                 │
//! │ • A / B buffers │ │ • Dedup by id   │ │ • FIFO bounded  │
//! │ • Preload       │ │ • Cursors       │ │ • `SQLite` kv   │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Content sources (Bluesky XRPC) and engagement calls
//! - [`app`] - Terminal front end
//! - [`config`] - Configuration management
//! - [`db`] - `SQLite` key-value store
//! - [`demo`] - Offline synthetic content source
//! - [`media`] - Media backend seam and a simulated backend
//! - [`models`] - Queue items and media references
//! - [`seen`] - Bounded, persisted seen-item set
//! - [`tv`] - The player: queue, aggregation, slots, transitions, session
//!
//! ## Example
//!
//! ```no_run
//! use perch_tv::{Config, app, demo::DemoSource, seen::{SeenConfig, SeenStore}, storage::MemoryStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
//!     let config = Config::default();
//!     let seen = SeenStore::open(MemoryStore::new(), SeenConfig::tv(config.seen_capacity));
//!     app::run_tv(&rt, DemoSource::new(), seen, config.tv_settings(), Some("cats".into()))
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/perch-tv/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::similar_names)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod media;
pub mod models;
pub mod paths;
pub mod seen;
pub mod storage;
pub mod tv;

// Re-export main types for convenience
pub use config::Config;
pub use db::Database;
pub use models::{MediaRef, QueueItem};
pub use tv::{Player, TvSettings};

/// ASCII logo for the application
pub const LOGO: &str = r"
    ___                 __       __ _   __
   / _ \___ _______/ /     / /| | / /
  / ___/ -_) __/ __/ _ \   / __/ |/ /
 /_/   \__/_/  \__/_//_/   \__/|___/
";

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository URL
pub const REPO_URL: &str = "https://github.com/ricardodantas/perch";

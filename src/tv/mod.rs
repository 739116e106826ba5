//! Continuous video feed ("TV mode").
//!
//! [`session::Player`] is the state machine: it owns the queue, the seen-set,
//! both playback slots and the transition controller, and describes the I/O
//! it needs as [`session::Effect`]s. [`driver`] runs a player against real
//! sources, a media backend and a presenter.

pub mod aggregator;
pub mod driver;
pub mod queue;
pub mod session;
pub mod slots;
pub mod transition;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use crate::api::bluesky::DISCOVER_FEED_URI;

pub use driver::{Command, Driver, Presenter};
pub use session::{Effect, Overlay, Player, SessionState, Status};

/// Tunables of a TV session
#[derive(Debug, Clone, PartialEq)]
pub struct TvSettings {
    /// Items requested per source call
    pub page_size: usize,
    /// Algorithmic feed used when no topic is set
    pub discover_feed: String,
    /// Keep items carrying adult content labels
    pub allow_adult_content: bool,
    /// Prefetch when fewer unplayed items than this remain
    pub low_watermark: usize,
    /// Clips shorter than this (seconds) are skipped
    pub min_duration_secs: f64,
    /// Slide animation length
    pub transition: Duration,
}

impl Default for TvSettings {
    fn default() -> Self {
        Self {
            page_size: 25,
            discover_feed: DISCOVER_FEED_URI.to_string(),
            allow_adult_content: false,
            low_watermark: 5,
            min_duration_secs: 5.0,
            transition: Duration::from_millis(320),
        }
    }
}

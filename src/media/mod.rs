//! Media backend seam: adaptive-streaming sessions and their events.
//!
//! The player never decodes video itself. A [`MediaBackend`] owns the real
//! streaming sessions (an HLS player per slot in a GUI embedder, a timer in
//! the terminal build) and reports progress back as [`MediaEvent`]s.

mod simulated;

pub use simulated::{FAIL_MARKER, SimulatedBackend};

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;

use crate::models::MediaRef;

/// Animated image formats that are served like a stream but aren't video
static ANIMATED_IMAGE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\.(gif|apng)([?#].*)?$").ok());

/// Whether a media URL points at an animated image rather than a video
pub fn is_animated_image(url: &str) -> bool {
    ANIMATED_IMAGE
        .as_ref()
        .is_some_and(|re| re.is_match(url.trim()))
}

/// Identity of one streaming session; never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// What happened to a session
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEventKind {
    /// Stream metadata is available (duration in seconds, if finite and known)
    Metadata {
        /// Duration in seconds
        duration: Option<f64>,
    },
    /// Enough is buffered to start playback
    Ready,
    /// Playback reached the end of the media
    Ended,
    /// The session reported an error
    Error {
        /// Whether the session can't recover
        fatal: bool,
        /// Backend-specific description
        detail: String,
    },
}

/// A backend notification about one session
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    /// Session the event belongs to
    pub session: SessionHandle,
    /// Event payload
    pub kind: MediaEventKind,
}

impl MediaEvent {
    /// Build an event
    pub const fn new(session: SessionHandle, kind: MediaEventKind) -> Self {
        Self { session, kind }
    }
}

/// Receiver of backend events (the driver's event channel)
pub trait MediaEventSink {
    /// Deliver an event; must not call back into the backend
    fn emit(&self, event: MediaEvent);
}

/// Adaptive-streaming backend.
///
/// Every method is fire-and-forget; outcomes arrive as [`MediaEvent`]s.
/// A session must be destroyed before its slot is given a new one.
pub trait MediaBackend {
    /// Create a session for `media` and start loading it (paused)
    fn open(&mut self, session: SessionHandle, media: &MediaRef);

    /// Release a session and everything it holds
    fn destroy(&mut self, session: SessionHandle);

    /// Start or resume playback
    fn play(&mut self, session: SessionHandle);

    /// Pause playback
    fn pause(&mut self, session: SessionHandle);

    /// Mute or unmute
    fn set_muted(&mut self, session: SessionHandle, muted: bool);

    /// Change the playback rate (1.0 is normal speed)
    fn set_rate(&mut self, session: SessionHandle, rate: f64);
}

//! Playback slot manager: the two media buffers and their sessions.
//!
//! Exactly two slots exist. One is active (visible, audible), the other idle
//! and used to preload the next item. The active role is swapped by flipping
//! [`SlotId`], never by moving sessions around.

use crate::media::{MediaBackend, MediaEvent, MediaEventKind, SessionHandle, is_animated_image};
use crate::models::{MediaRef, QueueItem};

/// Identity of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    /// First slot
    A,
    /// Second slot
    B,
}

impl SlotId {
    /// The other slot
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// No session
    #[default]
    Idle,
    /// Session created, buffering
    Loading,
    /// Buffered, waiting to be shown
    Ready,
    /// Active and playing (or paused by the user)
    Playing,
    /// Session failed and was released
    Error,
}

/// One playback buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slot {
    /// Lifecycle state
    pub state: SlotState,
    /// Live streaming session, if any
    pub session: Option<SessionHandle>,
    /// Id of the item loaded into this slot
    pub bound_item: Option<String>,
    /// Duration reported by the stream metadata
    pub duration: Option<f64>,
    ended: bool,
}

/// Whether a media reference can be shown in this mode
#[derive(Debug, Clone, PartialEq)]
pub enum Playability {
    /// Worth loading
    Playable,
    /// No stream URL
    Unresolvable,
    /// The URL is an animated image, not a video
    AnimatedImage,
    /// Known duration below the minimum
    TooShort(f64),
}

/// Classify media before loading it
pub fn classify(media: &MediaRef, min_duration: f64) -> Playability {
    let Some(url) = media.stream_url.as_deref().filter(|u| !u.is_empty()) else {
        return Playability::Unresolvable;
    };
    if is_animated_image(url) {
        return Playability::AnimatedImage;
    }
    match media.duration_hint {
        Some(d) if is_too_short(d, min_duration) => Playability::TooShort(d),
        _ => Playability::Playable,
    }
}

fn is_too_short(duration: f64, min_duration: f64) -> bool {
    duration.is_finite() && duration < min_duration
}

/// Why an item was skipped
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Rejected before loading
    NotPlayable(Playability),
    /// Stream metadata reported a short clip
    TooShort(f64),
    /// The streaming session failed
    Error(String),
}

/// Result of `load_into`
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// A new session is loading
    Loading(SessionHandle),
    /// The item can't be shown; the slot wasn't touched
    Skipped(Playability),
}

/// What a media event means to the player
#[derive(Debug, Clone, PartialEq)]
pub enum SlotSignal {
    /// Stale or informational event
    Ignored,
    /// The active slot started playing
    ActiveReady,
    /// The active slot reached the end of its media (reported once)
    ActiveEnded {
        /// Item that finished
        item_id: String,
    },
    /// The active item must be skipped
    ActiveFailed {
        /// Failed item
        item_id: String,
        /// Why
        reason: SkipReason,
    },
    /// The preloaded item must be skipped when reached
    IdleFailed {
        /// Failed item
        item_id: String,
        /// Why
        reason: SkipReason,
    },
}

/// Owner of both slots and of every streaming session
pub struct SlotManager<M: MediaBackend> {
    backend: M,
    slots: [Slot; 2],
    active: SlotId,
    next_session: u64,
    min_duration: f64,
    rate: f64,
    autoplay: bool,
}

impl<M: MediaBackend> SlotManager<M> {
    /// Create a manager with two idle slots
    pub fn new(backend: M, min_duration: f64) -> Self {
        Self {
            backend,
            slots: [Slot::default(), Slot::default()],
            active: SlotId::A,
            next_session: 0,
            min_duration,
            rate: 1.0,
            autoplay: true,
        }
    }

    /// Whether the active slot starts playing once it is ready
    pub const fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
    }

    /// The visible slot
    pub const fn active(&self) -> SlotId {
        self.active
    }

    /// The preloading slot
    pub const fn idle(&self) -> SlotId {
        self.active.other()
    }

    /// Inspect a slot
    pub const fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    /// The media backend
    pub const fn backend(&self) -> &M {
        &self.backend
    }

    /// Minimum clip duration in seconds
    pub const fn min_duration(&self) -> f64 {
        self.min_duration
    }

    fn slot_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id.index()]
    }

    /// Whether `id` is already loading or holding `item_id`
    pub fn is_bound(&self, id: SlotId, item_id: &str) -> bool {
        let slot = self.slot(id);
        matches!(slot.state, SlotState::Loading | SlotState::Ready)
            && slot.bound_item.as_deref() == Some(item_id)
    }

    /// Load an item into a slot, replacing whatever it held.
    ///
    /// Non-playable media is rejected without touching the slot. Completion
    /// is reported later through [`SlotManager::on_event`].
    pub fn load_into(&mut self, id: SlotId, item: &QueueItem) -> LoadOutcome {
        let playability = classify(&item.media, self.min_duration);
        if playability != Playability::Playable {
            tracing::debug!("Skipping {} ({playability:?})", item.id);
            return LoadOutcome::Skipped(playability);
        }

        self.teardown(id);

        self.next_session += 1;
        let session = SessionHandle(self.next_session);
        self.backend.open(session, &item.media);

        let slot = self.slot_mut(id);
        slot.state = SlotState::Loading;
        slot.session = Some(session);
        slot.bound_item = Some(item.id.clone());
        tracing::debug!("Loading {} into slot {id:?} ({session})", item.id);

        LoadOutcome::Loading(session)
    }

    /// Release a slot's session and return it to `Idle`
    pub fn teardown(&mut self, id: SlotId) {
        let slot = std::mem::take(self.slot_mut(id));
        if let Some(session) = slot.session {
            self.backend.destroy(session);
        }
    }

    /// Release both slots (leaving the feature or restarting)
    pub fn teardown_all(&mut self) {
        self.teardown(SlotId::A);
        self.teardown(SlotId::B);
        self.active = SlotId::A;
        self.rate = 1.0;
    }

    /// Make `incoming` the active slot; the previous active slot is paused
    /// and released. Playback starts as soon as `incoming` is ready unless
    /// autoplay is off.
    pub fn swap_to(&mut self, incoming: SlotId) {
        let outgoing = self.active;
        if outgoing != incoming {
            if let Some(session) = self.slot(outgoing).session {
                self.backend.pause(session);
            }
            self.teardown(outgoing);
        }
        self.active = incoming;
        self.rate = 1.0;

        let Some(session) = self.slot(incoming).session else {
            return;
        };
        self.backend.set_muted(session, false);
        self.backend.set_rate(session, 1.0);
        if self.slot(incoming).state == SlotState::Ready {
            if self.autoplay {
                self.backend.play(session);
            }
            self.slot_mut(incoming).state = SlotState::Playing;
        }
    }

    /// Pause the active session
    pub fn pause_active(&mut self) {
        if let Some(session) = self.slot(self.active).session {
            self.backend.pause(session);
        }
    }

    /// Resume the active session if it is ready
    pub fn resume_active(&mut self) {
        let slot = self.slot(self.active);
        if let (Some(session), SlotState::Playing) = (slot.session, slot.state) {
            self.backend.play(session);
        }
    }

    /// Change the active session's playback rate
    pub fn set_active_rate(&mut self, rate: f64) {
        self.rate = rate;
        if let Some(session) = self.slot(self.active).session {
            self.backend.set_rate(session, rate);
        }
    }

    /// Current playback rate of the active slot
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    fn find(&self, session: SessionHandle) -> Option<SlotId> {
        [SlotId::A, SlotId::B]
            .into_iter()
            .find(|id| self.slot(*id).session == Some(session))
    }

    fn fail(&mut self, id: SlotId, reason: SkipReason) -> SlotSignal {
        if let Some(session) = self.slot_mut(id).session.take() {
            self.backend.destroy(session);
        }
        let slot = self.slot_mut(id);
        slot.state = SlotState::Error;
        let item_id = slot.bound_item.clone().unwrap_or_default();

        if id == self.active {
            SlotSignal::ActiveFailed { item_id, reason }
        } else {
            SlotSignal::IdleFailed { item_id, reason }
        }
    }

    /// Apply a backend event and report what it means
    pub fn on_event(&mut self, event: MediaEvent) -> SlotSignal {
        let Some(id) = self.find(event.session) else {
            tracing::debug!("Dropping event for released {}", event.session);
            return SlotSignal::Ignored;
        };
        let is_active = id == self.active;

        match event.kind {
            MediaEventKind::Metadata { duration } => {
                self.slot_mut(id).duration = duration;
                match duration {
                    Some(d) if is_too_short(d, self.min_duration) => {
                        tracing::debug!("Clip in slot {id:?} is only {d:.1}s");
                        self.fail(id, SkipReason::TooShort(d))
                    }
                    _ => SlotSignal::Ignored,
                }
            }
            MediaEventKind::Ready => {
                if self.slot(id).state != SlotState::Loading {
                    return SlotSignal::Ignored;
                }
                if is_active {
                    if self.autoplay {
                        self.backend.play(event.session);
                    }
                    self.slot_mut(id).state = SlotState::Playing;
                    SlotSignal::ActiveReady
                } else {
                    self.slot_mut(id).state = SlotState::Ready;
                    SlotSignal::Ignored
                }
            }
            MediaEventKind::Ended => {
                let slot = self.slot_mut(id);
                if !is_active || slot.state != SlotState::Playing || slot.ended {
                    return SlotSignal::Ignored;
                }
                slot.ended = true;
                SlotSignal::ActiveEnded {
                    item_id: slot.bound_item.clone().unwrap_or_default(),
                }
            }
            MediaEventKind::Error { fatal: false, detail } => {
                tracing::debug!("Recoverable media error in slot {id:?}: {detail}");
                SlotSignal::Ignored
            }
            MediaEventKind::Error { fatal: true, detail } => {
                tracing::warn!("Fatal media error in slot {id:?}: {detail}");
                self.fail(id, SkipReason::Error(detail))
            }
        }
    }
}

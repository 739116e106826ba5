//! TV session state machine.
//!
//! The player never performs I/O itself. Every input (user command, fetch
//! result, media event, finished animation) is a method call, and everything
//! the outside world has to do is queued as an [`Effect`] for the driver to
//! pick up with [`Player::take_effects`].
//!
//! Results that belong to an older session (a fetch started before `stop`,
//! an animation that was cancelled) are recognised by their generation or
//! token and dropped.

use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use super::TvSettings;
use super::aggregator::{ContentPolicy, FetchOutcome, FetchPlan, MergeReport, merge, normalize_topic};
use super::queue::Queue;
use super::slots::{LoadOutcome, Playability, SlotManager, SlotSignal, SlotState, classify};
use super::transition::{
    Committed, Direction, Resolution, SlideAnimation, TransitionController, TransitionToken,
    resolve_target,
};
use crate::media::{MediaBackend, MediaEvent};
use crate::models::QueueItem;
use crate::seen::SeenStore;
use crate::storage::KeyValueStore;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not running; no sessions, no queue
    Stopped,
    /// Waiting for the first batch
    Starting,
    /// Playing (auto-advance on end)
    Playing,
    /// Paused by the user; navigation still works
    Paused,
}

/// Why a fetch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// First batch of a session
    Initial,
    /// Navigation ran past the end of the queue
    TopUp,
    /// The queue is running low
    Prefetch,
}

/// User-facing session status
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// The first batch is loading
    Loading {
        /// Topic of the session
        topic: Option<String>,
    },
    /// Sources have nothing new
    Exhausted {
        /// Topic of the session
        topic: Option<String>,
    },
    /// Every source failed and nothing is queued
    Unavailable {
        /// First source error
        message: String,
    },
    /// The session ended
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading { topic: Some(topic) } => write!(f, "Loading videos about #{topic}..."),
            Self::Loading { topic: None } => write!(f, "Loading your video feed..."),
            Self::Exhausted { topic: Some(topic) } => {
                write!(f, "No more videos about #{topic} right now")
            }
            Self::Exhausted { topic: None } => write!(f, "No more videos right now"),
            Self::Unavailable { message } => write!(f, "Couldn't load videos: {message}"),
            Self::Stopped => write!(f, "TV stopped"),
        }
    }
}

/// Overlay contents for the item on screen
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Item on screen
    pub item: QueueItem,
    /// Its queue index
    pub index: usize,
    /// Queue length
    pub queued: usize,
    /// Whether the session is paused
    pub paused: bool,
    /// Whether fast-forward is held
    pub fast_forward: bool,
}

/// Work the driver must perform on the player's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Query the sources and report back with [`Player::on_fetched`]
    Fetch {
        /// Session generation to echo back
        generation: u64,
        /// Why
        reason: FetchReason,
        /// What to query
        plan: FetchPlan,
    },
    /// Run a slide and report back with [`Player::on_transition_finished`]
    Animate(SlideAnimation),
    /// Redraw the overlay
    Overlay(Overlay),
    /// Show a status message
    Status(Status),
}

/// The TV player
pub struct Player<M: MediaBackend, K: KeyValueStore> {
    settings: TvSettings,
    slots: SlotManager<M>,
    seen: SeenStore<K>,
    queue: Queue,
    transition: TransitionController,
    failed: HashSet<String>,
    topic: Option<String>,
    current: Option<usize>,
    last_direction: Direction,
    state: SessionState,
    generation: u64,
    session_id: Option<Uuid>,
    fetch_in_flight: bool,
    held: bool,
    effects: Vec<Effect>,
}

impl<M: MediaBackend, K: KeyValueStore> Player<M, K> {
    /// Create a stopped player
    pub fn new(backend: M, seen: SeenStore<K>, settings: TvSettings) -> Self {
        Self {
            slots: SlotManager::new(backend, settings.min_duration_secs),
            transition: TransitionController::new(settings.transition),
            settings,
            seen,
            queue: Queue::new(),
            failed: HashSet::new(),
            topic: None,
            current: None,
            last_direction: Direction::Forward,
            state: SessionState::Stopped,
            generation: 0,
            session_id: None,
            fetch_in_flight: false,
            held: false,
            effects: Vec::new(),
        }
    }

    /// Current lifecycle state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether playback is underway (playing or paused)
    pub const fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Playing | SessionState::Paused)
    }

    /// Generation of the current session; bumped on every start and stop
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Id of the current session
    pub const fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Normalized topic of the current session
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Items queued this session
    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The two playback slots
    pub const fn slots(&self) -> &SlotManager<M> {
        &self.slots
    }

    /// Seen-set consulted when merging fetches
    pub const fn seen(&self) -> &SeenStore<K> {
        &self.seen
    }

    /// Player settings
    pub const fn settings(&self) -> &TvSettings {
        &self.settings
    }

    /// Queue index on screen
    pub const fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Item on screen
    pub fn current_item(&self) -> Option<&QueueItem> {
        self.current.and_then(|i| self.queue.get(i))
    }

    /// Whether fast-forward is held
    pub const fn is_fast_forward(&self) -> bool {
        self.held
    }

    /// Whether a fetch result is outstanding
    pub const fn is_fetching(&self) -> bool {
        self.fetch_in_flight
    }

    /// Drain queued effects
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Start a session, stopping the running one first
    pub fn start(&mut self, topic: Option<&str>) {
        if self.state != SessionState::Stopped {
            self.stop();
        }

        self.generation += 1;
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.topic = topic.and_then(normalize_topic);
        self.queue.clear();
        self.failed.clear();
        self.current = None;
        self.last_direction = Direction::Forward;
        self.held = false;
        self.fetch_in_flight = false;
        self.transition.reset();
        self.slots.set_autoplay(true);
        self.state = SessionState::Starting;

        tracing::info!(
            "Starting TV session {session_id} (topic: {})",
            self.topic.as_deref().unwrap_or("none")
        );
        self.effects.push(Effect::Status(Status::Loading {
            topic: self.topic.clone(),
        }));
        self.request_fetch(FetchReason::Initial);
    }

    /// Stop the session and release every streaming session
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }

        self.slots.teardown_all();
        self.queue.clear();
        self.failed.clear();
        self.transition.reset();
        self.current = None;
        self.held = false;
        self.fetch_in_flight = false;
        self.generation += 1;
        self.state = SessionState::Stopped;

        if let Some(id) = self.session_id {
            tracing::info!("Stopped TV session {id}");
        }
        self.effects.push(Effect::Status(Status::Stopped));
    }

    /// Pause playback and auto-advance
    pub fn pause(&mut self) {
        if self.state != SessionState::Playing {
            return;
        }
        self.release_hold();
        self.state = SessionState::Paused;
        self.slots.set_autoplay(false);
        self.slots.pause_active();
        self.emit_overlay();
    }

    /// Resume after [`Player::pause`]
    pub fn resume(&mut self) {
        if self.state != SessionState::Paused {
            return;
        }
        self.state = SessionState::Playing;
        self.slots.set_autoplay(true);
        self.slots.resume_active();
        self.emit_overlay();
    }

    /// Pause when playing, resume when paused
    pub fn toggle_pause(&mut self) {
        match self.state {
            SessionState::Playing => self.pause(),
            SessionState::Paused => self.resume(),
            SessionState::Stopped | SessionState::Starting => {}
        }
    }

    /// Play at double speed while held
    pub fn hold_start(&mut self) {
        if self.state != SessionState::Playing || self.held || self.current.is_none() {
            return;
        }
        self.held = true;
        self.slots.set_active_rate(2.0);
        self.emit_overlay();
    }

    /// Back to normal speed
    pub fn hold_end(&mut self) {
        if self.release_hold() {
            self.emit_overlay();
        }
    }

    fn release_hold(&mut self) -> bool {
        if !self.held {
            return false;
        }
        self.held = false;
        self.slots.set_active_rate(1.0);
        true
    }

    /// Move to the next item. Ignored while another navigation is in flight.
    /// Before the first item plays, retries the initial fetch.
    pub fn advance(&mut self) {
        if self.state == SessionState::Starting && !self.fetch_in_flight {
            self.request_fetch(FetchReason::Initial);
            return;
        }
        if !self.is_running() || self.transition.is_in_flight() {
            return;
        }
        let target = self.current.map_or(0, |i| i + 1);
        self.navigate(Direction::Forward, target, true);
    }

    /// Move to the previous item. Ignored at the start of the queue.
    pub fn retreat(&mut self) {
        if !self.is_running() || self.transition.is_in_flight() {
            return;
        }
        let Some(current) = self.current.filter(|i| *i > 0) else {
            return;
        };
        self.navigate(Direction::Backward, current - 1, true);
    }

    /// Apply the result of an [`Effect::Fetch`]
    pub fn on_fetched(&mut self, generation: u64, reason: FetchReason, outcome: FetchOutcome) {
        if generation != self.generation || self.state == SessionState::Stopped {
            tracing::debug!("Dropping {reason:?} fetch from generation {generation}");
            return;
        }
        self.fetch_in_flight = false;

        let policy = ContentPolicy {
            allow_adult_content: self.settings.allow_adult_content,
        };
        let report = merge(&mut self.queue, outcome, &self.seen, policy);
        tracing::debug!(
            "{reason:?} fetch queued {} ({} total)",
            report.appended,
            self.queue.len()
        );

        match self.state {
            SessionState::Starting => {
                if self.queue.is_empty() {
                    self.report_no_content(&report);
                    return;
                }
                self.state = SessionState::Playing;
                self.navigate(Direction::Forward, 0, false);
            }
            SessionState::Playing | SessionState::Paused => {
                if let Some((direction, target, animate)) = self.transition.awaiting() {
                    self.transition.reset();
                    if target < self.queue.len() {
                        self.navigate(direction, target, animate);
                    } else {
                        self.report_no_content(&report);
                    }
                } else if report.appended == 0 {
                    tracing::debug!("Prefetch found nothing new");
                } else if !self.transition.is_in_flight() {
                    self.preload_next();
                }
            }
            SessionState::Stopped => {}
        }
    }

    /// Apply a media backend event
    pub fn on_media_event(&mut self, event: MediaEvent) {
        if !self.is_running() {
            tracing::debug!("Dropping {:?} for {}", event.kind, event.session);
            return;
        }

        match self.slots.on_event(event) {
            SlotSignal::Ignored | SlotSignal::ActiveReady => {}
            SlotSignal::ActiveEnded { item_id } => {
                let Some(current) = self.current else {
                    return;
                };
                self.consume(current);
                if self.state == SessionState::Paused {
                    tracing::debug!("{item_id} ended while paused");
                    return;
                }
                if !self.transition.is_in_flight() {
                    self.navigate(Direction::Forward, current + 1, true);
                }
            }
            SlotSignal::ActiveFailed { item_id, reason } => {
                tracing::info!("Skipping {item_id}: {reason:?}");
                self.failed.insert(item_id);
                if !self.transition.is_in_flight() {
                    self.skip_current();
                }
            }
            SlotSignal::IdleFailed { item_id, reason } => {
                tracing::info!("Preload of {item_id} failed: {reason:?}");
                self.failed.insert(item_id);
                if !self.transition.is_animating() {
                    self.preload_next();
                }
            }
        }
    }

    /// Commit a slide the presenter has finished
    pub fn on_transition_finished(&mut self, token: TransitionToken) {
        let Some(committed) = self.transition.finish(token) else {
            return;
        };
        if self.is_running() {
            self.commit(committed);
        }
    }

    fn is_skipped(&self, item: &QueueItem) -> bool {
        self.failed.contains(&item.id)
            || classify(&item.media, self.settings.min_duration_secs) != Playability::Playable
    }

    /// Returns false when nothing playable lies in `direction`
    fn navigate(&mut self, direction: Direction, mut target: usize, animate: bool) -> bool {
        loop {
            let resolution =
                resolve_target(&self.queue, target, direction, |item| self.is_skipped(item));
            let index = match resolution {
                Resolution::Ready(index) => index,
                Resolution::NeedsContent(index) => {
                    tracing::debug!("Waiting for item {index}");
                    self.transition.await_content(direction, index, animate);
                    self.request_fetch(FetchReason::TopUp);
                    return true;
                }
                Resolution::Blocked => {
                    tracing::debug!("Nothing playable {direction:?} of {target}");
                    return false;
                }
            };

            let Some(item) = self.queue.get(index).cloned() else {
                return false;
            };
            let incoming = self.slots.idle();
            if !self.slots.is_bound(incoming, &item.id)
                && let LoadOutcome::Skipped(_) = self.slots.load_into(incoming, &item)
            {
                self.failed.insert(item.id);
                target = index;
                continue;
            }

            if animate {
                let outgoing = self.slots.active();
                let animation = self.transition.begin(direction, index, incoming, outgoing);
                self.effects.push(Effect::Animate(animation));
            } else {
                self.commit(Committed {
                    direction,
                    target: index,
                    incoming,
                });
            }
            return true;
        }
    }

    fn commit(&mut self, committed: Committed) {
        if committed.direction == Direction::Forward
            && let Some(previous) = self.current
        {
            self.consume(previous);
        }

        self.held = false;
        self.slots.swap_to(committed.incoming);
        self.current = Some(committed.target);
        self.last_direction = committed.direction;
        self.emit_overlay();

        if self.slots.slot(committed.incoming).state == SlotState::Error {
            self.skip_current();
            return;
        }
        self.preload_next();
        self.check_low_watermark();
    }

    /// Leave a failed item in the direction of travel, falling back to
    /// forward when nothing earlier can play
    fn skip_current(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        let went_back = self.last_direction == Direction::Backward
            && current > 0
            && self.navigate(Direction::Backward, current - 1, true);
        if !went_back {
            self.navigate(Direction::Forward, current + 1, true);
        }
    }

    fn preload_next(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        let idle = self.slots.idle();
        let mut index = current + 1;

        while let Some(item) = self.queue.get(index).cloned() {
            index += 1;
            if self.is_skipped(&item) {
                continue;
            }
            if self.slots.is_bound(idle, &item.id) {
                return;
            }
            match self.slots.load_into(idle, &item) {
                LoadOutcome::Loading(_) => return,
                LoadOutcome::Skipped(_) => {
                    self.failed.insert(item.id);
                }
            }
        }
    }

    fn check_low_watermark(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        if self.queue.remaining_after(current) < self.settings.low_watermark {
            self.request_fetch(FetchReason::Prefetch);
        }
    }

    fn request_fetch(&mut self, reason: FetchReason) {
        if self.fetch_in_flight {
            tracing::debug!("Fetch in flight; {reason:?} waits for it");
            return;
        }
        self.fetch_in_flight = true;
        let plan = FetchPlan::for_queue(&self.queue, self.topic.as_deref(), &self.settings);
        self.effects.push(Effect::Fetch {
            generation: self.generation,
            reason,
            plan,
        });
    }

    fn report_no_content(&mut self, report: &MergeReport) {
        let status = match &report.first_error {
            Some(message) if report.all_failed() && self.queue.is_empty() => {
                Status::Unavailable {
                    message: message.clone(),
                }
            }
            _ => Status::Exhausted {
                topic: self.topic.clone(),
            },
        };
        tracing::info!("{status}");
        self.effects.push(Effect::Status(status));
    }

    /// Record an item as watched so later sessions skip it
    fn consume(&mut self, index: usize) {
        if let Some(item) = self.queue.get(index) {
            let engagement = item.engagement();
            let id = item.id.clone();
            self.seen.mark_seen(&id, Some(engagement));
        }
    }

    fn emit_overlay(&mut self) {
        let Some(index) = self.current else {
            return;
        };
        let Some(item) = self.queue.get(index) else {
            return;
        };
        self.effects.push(Effect::Overlay(Overlay {
            item: item.clone(),
            index,
            queued: self.queue.len(),
            paused: self.state == SessionState::Paused,
            fast_forward: self.held,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Page;
    use crate::media::{MediaEventKind, SessionHandle};
    use crate::models::MediaRef;
    use crate::seen::SeenConfig;
    use crate::storage::MemoryStore;
    use crate::tv::aggregator::fetch;
    use crate::tv::slots::SlotId;
    use crate::tv::testing::{FakeBackend, FakeSource, video, video_with_duration};

    type TestPlayer = Player<FakeBackend, MemoryStore>;

    fn player(backend: &FakeBackend) -> TestPlayer {
        let seen = SeenStore::open(MemoryStore::new(), SeenConfig::tv(100));
        Player::new(backend.clone(), seen, TvSettings::default())
    }

    fn page(ids: &[&str]) -> Page {
        Page::new(ids.iter().map(|id| video(id)).collect(), None)
    }

    /// Run every pending fetch against `source`
    fn run_fetches(player: &mut TestPlayer, source: &FakeSource) -> Vec<Effect> {
        let mut rest = Vec::new();
        loop {
            let effects = player.take_effects();
            if effects.is_empty() {
                return rest;
            }
            let mut fetched = false;
            for effect in effects {
                match effect {
                    Effect::Fetch {
                        generation,
                        reason,
                        plan,
                    } => {
                        let outcome = tokio_test::block_on(fetch(source, &plan));
                        player.on_fetched(generation, reason, outcome);
                        fetched = true;
                    }
                    other => rest.push(other),
                }
            }
            if !fetched {
                return rest;
            }
        }
    }

    fn animations(effects: &[Effect]) -> Vec<SlideAnimation> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Animate(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    fn statuses(effects: &[Effect]) -> Vec<Status> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    fn session(player: &TestPlayer, slot: SlotId) -> SessionHandle {
        player.slots().slot(slot).session.unwrap()
    }

    fn send(player: &mut TestPlayer, slot: SlotId, kind: MediaEventKind) {
        let handle = session(player, slot);
        player.on_media_event(MediaEvent::new(handle, kind));
    }

    fn active(player: &TestPlayer) -> SlotId {
        player.slots().active()
    }

    /// Start a session over `ids` and make the first item play
    fn started(backend: &FakeBackend, source: &FakeSource, ids: &[&str]) -> TestPlayer {
        source.push_timeline(Ok(page(ids)));
        let mut player = player(backend);
        player.start(None);
        run_fetches(&mut player, source);
        let slot = active(&player);
        send(&mut player, slot, MediaEventKind::Ready);
        player
    }

    fn finish_animation(player: &mut TestPlayer) {
        let effects = player.take_effects();
        let animation = animations(&effects).pop().unwrap();
        player.on_transition_finished(animation.token);
    }

    #[test]
    fn test_start_plays_first_item_unmuted() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let player = started(&backend, &source, &["a", "b", "c"]);

        assert_eq!(player.state(), SessionState::Playing);
        assert_eq!(player.current_item().unwrap().id, "a");
        let playing = session(&player, active(&player));
        assert_eq!(backend.playing(), vec![playing]);
        assert!(!backend.is_muted(playing));

        let idle = player.slots().slot(player.slots().idle());
        assert_eq!(idle.bound_item.as_deref(), Some("b"));
        assert_eq!(idle.state, SlotState::Loading);
    }

    #[test]
    fn test_advance_slides_forward_and_marks_seen() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        let idle = player.slots().idle();
        send(&mut player, idle, MediaEventKind::Ready);
        player.take_effects();

        player.advance();
        let effects = player.take_effects();
        let animation = animations(&effects).pop().unwrap();
        assert_eq!(animation.direction, Direction::Forward);
        assert_eq!(animation.incoming, idle);
        assert!((animation.incoming_from - 1.0).abs() < f32::EPSILON);

        player.on_transition_finished(animation.token);
        assert_eq!(player.current_item().unwrap().id, "b");
        assert_eq!(active(&player), idle);
        assert!(player.seen().has("a"));
        assert_eq!(backend.playing(), vec![session(&player, idle)]);
    }

    #[test]
    fn test_retreat_at_start_is_noop() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b"]);
        player.take_effects();
        let opened = backend.opened().len();

        player.retreat();
        assert!(player.take_effects().is_empty());
        assert_eq!(player.current_index(), Some(0));
        assert_eq!(backend.opened().len(), opened);
    }

    #[test]
    fn test_retreat_slides_backward() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        player.take_effects();
        player.advance();
        finish_animation(&mut player);

        player.retreat();
        let effects = player.take_effects();
        let animation = animations(&effects).pop().unwrap();
        assert_eq!(animation.direction, Direction::Backward);
        assert!((animation.incoming_from + 1.0).abs() < f32::EPSILON);
        player.on_transition_finished(animation.token);
        assert_eq!(player.current_item().unwrap().id, "a");
        assert!(!player.seen().has("b"));
    }

    #[test]
    fn test_double_advance_runs_one_transition() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        player.take_effects();

        player.advance();
        player.advance();
        let effects = player.take_effects();
        assert_eq!(animations(&effects).len(), 1);
        player.on_transition_finished(animations(&effects)[0].token);
        assert_eq!(player.current_index(), Some(1));
    }

    #[test]
    fn test_short_clip_is_skipped() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        source.push_timeline(Ok(Page::new(
            vec![video("a"), video_with_duration("short", 3.0), video("c")],
            None,
        )));
        let mut player = player(&backend);
        player.start(None);
        run_fetches(&mut player, &source);

        let idle = player.slots().slot(player.slots().idle());
        assert_eq!(idle.bound_item.as_deref(), Some("c"));

        player.advance();
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "c");
    }

    #[test]
    fn test_short_metadata_on_active_advances() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        source.push_timeline(Ok(page(&["a", "b", "c"])));
        let mut player = player(&backend);
        player.start(None);
        run_fetches(&mut player, &source);
        player.take_effects();

        let slot = active(&player);
        send(
            &mut player,
            slot,
            MediaEventKind::Metadata {
                duration: Some(4.0),
            },
        );
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "b");
        assert!(backend.live().iter().all(|s| !backend.destroyed().contains(s)));
    }

    #[test]
    fn test_gif_and_unresolvable_never_load() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut gif = video("gif");
        gif.media = MediaRef::stream("https://media.tenor.com/abc/loop.gif?x=1");
        source.push_timeline(Ok(Page::new(vec![gif, video("real")], None)));
        let mut player = player(&backend);
        player.start(None);
        run_fetches(&mut player, &source);

        assert_eq!(player.current_item().unwrap().id, "real");
        let urls: Vec<String> = backend
            .opened()
            .into_iter()
            .filter_map(|s| backend.url(s))
            .collect();
        assert!(urls.iter().all(|u| !u.contains(".gif")));
    }

    #[test]
    fn test_stop_mid_transition_then_restart() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        player.take_effects();

        player.advance();
        let old = animations(&player.take_effects()).pop().unwrap();
        player.stop();
        assert!(backend.live().is_empty());

        source.push_timeline(Ok(page(&["x", "y"])));
        player.start(None);
        run_fetches(&mut player, &source);
        player.on_transition_finished(old.token);

        assert_eq!(player.current_item().unwrap().id, "x");
        let live = backend.live();
        for id in [SlotId::A, SlotId::B] {
            let slot = player.slots().slot(id);
            if slot.state == SlotState::Playing {
                assert!(live.contains(&slot.session.unwrap()));
            }
        }
        assert!(backend.playing().iter().all(|s| live.contains(s)));
    }

    #[test]
    fn test_stale_fetch_dropped_after_restart() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        source.push_timeline(Ok(page(&["old"])));
        let mut player = player(&backend);
        player.start(None);
        let Some(Effect::Fetch {
            generation, plan, ..
        }) = player.take_effects().into_iter().find(|e| matches!(e, Effect::Fetch { .. }))
        else {
            panic!("expected fetch");
        };

        player.start(Some("cats"));
        let outcome = tokio_test::block_on(fetch(&source, &plan));
        player.on_fetched(generation, FetchReason::Initial, outcome);

        assert!(player.queue().is_empty());
        assert_eq!(player.state(), SessionState::Starting);
        assert!(player.is_fetching());
    }

    #[test]
    fn test_ended_advances_once() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        player.take_effects();

        let slot = active(&player);
        send(&mut player, slot, MediaEventKind::Ended);
        send(&mut player, slot, MediaEventKind::Ended);
        let effects = player.take_effects();
        assert_eq!(animations(&effects).len(), 1);
        assert!(player.seen().has("a"));
    }

    #[test]
    fn test_pause_suppresses_auto_advance() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        player.pause();
        assert!(backend.playing().is_empty());
        player.take_effects();

        let slot = active(&player);
        send(&mut player, slot, MediaEventKind::Ended);
        assert!(animations(&player.take_effects()).is_empty());
        assert_eq!(player.current_index(), Some(0));

        player.advance();
        finish_animation(&mut player);
        assert_eq!(player.current_index(), Some(1));
        let slot = active(&player);
        send(&mut player, slot, MediaEventKind::Ready);
        assert!(backend.playing().is_empty());

        player.resume();
        assert_eq!(backend.playing(), vec![session(&player, slot)]);
    }

    #[test]
    fn test_error_advances_even_when_paused() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        player.pause();
        player.take_effects();

        let slot = active(&player);
        send(
            &mut player,
            slot,
            MediaEventKind::Error {
                fatal: true,
                detail: "manifest 404".to_string(),
            },
        );
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "b");
    }

    #[test]
    fn test_failed_preload_skipped_when_reached() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        let idle = player.slots().idle();
        send(
            &mut player,
            idle,
            MediaEventKind::Error {
                fatal: true,
                detail: "403".to_string(),
            },
        );
        assert_eq!(
            player.slots().slot(idle).bound_item.as_deref(),
            Some("c")
        );

        player.advance();
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "c");
    }

    fn fail_active(player: &mut TestPlayer, detail: &str) {
        let slot = active(player);
        send(
            player,
            slot,
            MediaEventKind::Error {
                fatal: true,
                detail: detail.to_string(),
            },
        );
    }

    #[test]
    fn test_failure_after_retreat_falls_forward_when_nothing_earlier_plays() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c", "d", "e", "f"]);
        player.take_effects();

        fail_active(&mut player, "a gone");
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "b");
        player.advance();
        finish_animation(&mut player);
        player.retreat();
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "b");

        fail_active(&mut player, "b gone");
        let effects = player.take_effects();
        let animation = animations(&effects).pop().unwrap();
        assert_eq!(animation.direction, Direction::Forward);
        player.on_transition_finished(animation.token);
        assert_eq!(player.current_item().unwrap().id, "c");
        assert_ne!(player.slots().slot(active(&player)).state, SlotState::Error);
    }

    #[test]
    fn test_advance_retries_empty_initial_fetch() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = player(&backend);
        player.start(None);
        let effects = run_fetches(&mut player, &source);
        assert_eq!(
            statuses(&effects),
            vec![
                Status::Loading { topic: None },
                Status::Exhausted { topic: None }
            ]
        );
        assert_eq!(player.state(), SessionState::Starting);

        source.push_timeline(Ok(page(&["a", "b"])));
        player.advance();
        run_fetches(&mut player, &source);
        assert_eq!(player.state(), SessionState::Playing);
        assert_eq!(player.current_item().unwrap().id, "a");
    }

    #[test]
    fn test_prefetch_preloads_when_on_last_item() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b"]);
        run_fetches(&mut player, &source);

        player.advance();
        finish_animation(&mut player);
        assert_eq!(player.current_item().unwrap().id, "b");
        let idle = player.slots().idle();
        assert_eq!(player.slots().slot(idle).bound_item, None);

        source.push_timeline(Ok(page(&["c"])));
        run_fetches(&mut player, &source);
        let slot = player.slots().slot(idle);
        assert_eq!(slot.bound_item.as_deref(), Some("c"));
        assert_eq!(slot.state, SlotState::Loading);
    }

    #[test]
    fn test_hold_doubles_rate_until_released() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b"]);
        let playing = session(&player, active(&player));

        player.hold_start();
        assert_eq!(backend.rate(playing), Some(2.0));
        assert!(player.is_fast_forward());
        player.hold_end();
        assert_eq!(backend.rate(playing), Some(1.0));

        player.pause();
        player.hold_start();
        assert!(!player.is_fast_forward());
    }

    #[test]
    fn test_advance_past_end_fetches_then_reports_exhausted() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["only"]);
        let effects = run_fetches(&mut player, &source);
        assert!(statuses(&effects).is_empty());

        player.advance();
        let effects = run_fetches(&mut player, &source);
        assert_eq!(
            statuses(&effects),
            vec![Status::Exhausted { topic: None }]
        );
        assert_eq!(player.current_index(), Some(0));
        assert!(player.is_running());
    }

    #[test]
    fn test_advance_waits_for_growth() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a"]);
        run_fetches(&mut player, &source);

        source.push_timeline(Ok(page(&["b"])));
        player.advance();
        let effects = run_fetches(&mut player, &source);
        let animation = animations(&effects).pop().unwrap();
        player.on_transition_finished(animation.token);
        assert_eq!(player.current_item().unwrap().id, "b");
    }

    #[test]
    fn test_all_sources_failing_on_start() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        source.push_timeline(Err(anyhow::anyhow!("401 Unauthorized")));
        source.push_feed(Err(anyhow::anyhow!("feed down")));
        let mut player = player(&backend);
        player.start(None);
        let effects = run_fetches(&mut player, &source);

        assert_eq!(
            statuses(&effects),
            vec![
                Status::Loading { topic: None },
                Status::Unavailable {
                    message: "401 Unauthorized".to_string()
                }
            ]
        );
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn test_empty_topic_reports_exhausted() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = player(&backend);
        player.start(Some("#nothing"));
        let effects = run_fetches(&mut player, &source);

        assert_eq!(
            statuses(&effects).last(),
            Some(&Status::Exhausted {
                topic: Some("nothing".to_string())
            })
        );
    }

    #[test]
    fn test_low_watermark_prefetches_once() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        source.push_timeline(Ok(page(&["a", "b", "c"])));
        let mut player = player(&backend);
        player.start(None);
        let initial = player.take_effects();
        let Some(Effect::Fetch {
            generation,
            reason,
            plan,
        }) = initial.into_iter().find(|e| matches!(e, Effect::Fetch { .. }))
        else {
            panic!("expected fetch");
        };
        player.on_fetched(generation, reason, tokio_test::block_on(fetch(&source, &plan)));

        let fetches: Vec<FetchReason> = player
            .take_effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Fetch { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(fetches, vec![FetchReason::Prefetch]);

        player.advance();
        assert!(
            !player
                .take_effects()
                .iter()
                .any(|e| matches!(e, Effect::Fetch { .. }))
        );
    }

    #[test]
    fn test_stop_releases_everything() {
        let backend = FakeBackend::default();
        let source = FakeSource::new();
        let mut player = started(&backend, &source, &["a", "b", "c"]);
        let generation = player.generation();

        player.stop();
        assert_eq!(player.state(), SessionState::Stopped);
        assert!(backend.live().is_empty());
        assert!(player.queue().is_empty());
        assert!(player.generation() > generation);
        assert_eq!(
            statuses(&player.take_effects()).last(),
            Some(&Status::Stopped)
        );

        player.advance();
        assert!(player.take_effects().is_empty());
    }
}

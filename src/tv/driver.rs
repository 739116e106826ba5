//! Event loop around a [`Player`].
//!
//! Every input (user commands, media events, finished fetches and
//! animations) arrives through one unbounded channel. Background work runs as
//! `spawn_local` tasks that post their results back into the same channel,
//! so the driver has to run inside a [`tokio::task::LocalSet`].

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tokio::sync::mpsc;

use super::aggregator::{self, FetchOutcome};
use super::session::{Effect, FetchReason, Overlay, Player, Status};
use super::transition::{SlideAnimation, TransitionToken};
use crate::api::{ContentSource, EngagementApi};
use crate::media::{MediaBackend, MediaEvent, MediaEventSink};
use crate::models::QueueItem;
use crate::storage::KeyValueStore;

/// Commands from the user interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start (or restart) a session
    Start {
        /// Optional topic
        topic: Option<String>,
    },
    /// Stop the session
    Stop,
    /// Next item
    Next,
    /// Previous item
    Previous,
    /// Pause or resume
    TogglePause,
    /// Fast-forward pressed
    HoldStart,
    /// Fast-forward released
    HoldEnd,
    /// Like or unlike the item on screen
    ToggleLike,
    /// Repost or undo the repost of the item on screen
    ToggleRepost,
    /// Open the author's profile
    OpenProfile,
    /// Open the post thread
    OpenThread,
    /// Stop and leave the event loop
    Shutdown,
}

/// Engagement operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngagementAction {
    /// Create a like record
    Like,
    /// Delete the like record
    Unlike,
    /// Create a repost record
    Repost,
    /// Delete the repost record
    Unrepost,
}

impl EngagementAction {
    const fn kind(self) -> EngagementKind {
        match self {
            Self::Like | Self::Unlike => EngagementKind::Like,
            Self::Repost | Self::Unrepost => EngagementKind::Repost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EngagementKind {
    Like,
    Repost,
}

/// Everything the driver reacts to
#[derive(Debug)]
pub enum Event {
    /// User input
    Command(Command),
    /// Media backend notification
    Media(MediaEvent),
    /// A fetch task finished
    Fetched {
        /// Session generation the fetch was issued for
        generation: u64,
        /// Why it was issued
        reason: FetchReason,
        /// Per-source results
        outcome: FetchOutcome,
    },
    /// A slide animation finished
    TransitionFinished(TransitionToken),
    /// An engagement call finished; `Ok` carries the new record URI, if any
    Engaged {
        /// Item the call was about
        item_id: String,
        /// What was attempted
        action: EngagementAction,
        /// New record URI, or the error message
        result: Result<Option<String>, String>,
    },
}

/// Cloneable handle for posting events to the driver
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    /// Post an event; silently dropped once the driver is gone
    pub fn send(&self, event: Event) {
        if self.0.send(event).is_err() {
            tracing::debug!("Driver gone; dropping event");
        }
    }

    /// Post a user command
    pub fn command(&self, command: Command) {
        self.send(Event::Command(command));
    }
}

impl MediaEventSink for EventSender {
    fn emit(&self, event: MediaEvent) {
        self.send(Event::Media(event));
    }
}

/// Receiving end of the driver channel
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the driver channel. The sender is needed up front to build the
/// media backend.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

/// Where an overlay tap leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Author profile
    Profile {
        /// Author handle
        handle: String,
        /// Web URL of the profile
        url: String,
    },
    /// Post thread
    Thread {
        /// AT URI of the post
        uri: String,
        /// Web URL of the thread
        url: String,
    },
}

/// Engagement state of the item on screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementState {
    /// The viewer liked the item this session
    pub liked: bool,
    /// The viewer reposted the item this session
    pub reposted: bool,
}

/// Renders what the player decides
pub trait Presenter {
    /// Start a slide; completion is timed by the driver
    fn animate(&mut self, animation: &SlideAnimation);

    /// Show metadata for the item on screen
    fn overlay(&mut self, overlay: &Overlay, engagement: EngagementState);

    /// Show a session status message
    fn status(&mut self, status: &Status);

    /// Leave TV mode for a profile or thread
    fn navigate(&mut self, destination: &Destination);

    /// Transient message (failed engagement call and the like)
    fn notice(&mut self, message: &str);
}

#[derive(Debug, Default)]
struct Records {
    like_uri: Option<String>,
    repost_uri: Option<String>,
}

/// Runs a [`Player`] against a source and a presenter
pub struct Driver<S, M, K, P>
where
    S: ContentSource + EngagementApi + 'static,
    M: MediaBackend,
    K: KeyValueStore,
    P: Presenter,
{
    player: Player<M, K>,
    source: Rc<S>,
    presenter: P,
    events: EventSender,
    rx: EventReceiver,
    records: HashMap<String, Records>,
    pending: HashSet<(String, EngagementKind)>,
    overlay: Option<Overlay>,
}

impl<S, M, K, P> Driver<S, M, K, P>
where
    S: ContentSource + EngagementApi + 'static,
    M: MediaBackend,
    K: KeyValueStore,
    P: Presenter,
{
    /// Wire a driver; `events` and `rx` come from [`channel`]
    pub fn new(
        player: Player<M, K>,
        source: Rc<S>,
        presenter: P,
        events: EventSender,
        rx: EventReceiver,
    ) -> Self {
        Self {
            player,
            source,
            presenter,
            events,
            rx,
            records: HashMap::new(),
            pending: HashSet::new(),
            overlay: None,
        }
    }

    /// Sender for commands and backend events
    pub fn sender(&self) -> EventSender {
        self.events.clone()
    }

    /// The driven player
    pub const fn player(&self) -> &Player<M, K> {
        &self.player
    }

    /// The presenter
    pub const fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Process events until [`Command::Shutdown`], then stop the session.
    /// Returns the driver so callers can inspect the final state.
    pub async fn run(mut self) -> Self {
        while let Some(event) = self.rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        self.player.stop();
        self.flush();
        self
    }

    /// Apply one event; false means shut down
    pub fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Command(Command::Shutdown) => return false,
            Event::Command(command) => self.command(command),
            Event::Media(event) => self.player.on_media_event(event),
            Event::Fetched {
                generation,
                reason,
                outcome,
            } => self.player.on_fetched(generation, reason, outcome),
            Event::TransitionFinished(token) => self.player.on_transition_finished(token),
            Event::Engaged {
                item_id,
                action,
                result,
            } => self.engaged(item_id, action, result),
        }
        self.flush();
        true
    }

    fn command(&mut self, command: Command) {
        match command {
            Command::Start { topic } => {
                self.overlay = None;
                self.player.start(topic.as_deref());
            }
            Command::Stop => {
                self.overlay = None;
                self.player.stop();
            }
            Command::Next => self.player.advance(),
            Command::Previous => self.player.retreat(),
            Command::TogglePause => self.player.toggle_pause(),
            Command::HoldStart => self.player.hold_start(),
            Command::HoldEnd => self.player.hold_end(),
            Command::ToggleLike => self.toggle(EngagementKind::Like),
            Command::ToggleRepost => self.toggle(EngagementKind::Repost),
            Command::OpenProfile => {
                if let Some(item) = self.player.current_item() {
                    let destination = Destination::Profile {
                        handle: item.author_handle.clone(),
                        url: item.profile_url(),
                    };
                    self.leave(&destination);
                }
            }
            Command::OpenThread => {
                if let Some(item) = self.player.current_item() {
                    let destination = Destination::Thread {
                        uri: item.id.clone(),
                        url: item.thread_url(),
                    };
                    self.leave(&destination);
                }
            }
            Command::Shutdown => {}
        }
    }

    /// Pause playback and hand control to the presenter
    fn leave(&mut self, destination: &Destination) {
        self.player.pause();
        self.presenter.navigate(destination);
    }

    fn toggle(&mut self, kind: EngagementKind) {
        let Some(item) = self.player.current_item().cloned() else {
            return;
        };
        if !self.pending.insert((item.id.clone(), kind)) {
            tracing::debug!("{kind:?} on {} already in flight", item.id);
            return;
        }

        let records = self.records.entry(item.id.clone()).or_default();
        let existing = match kind {
            EngagementKind::Like => records.like_uri.clone(),
            EngagementKind::Repost => records.repost_uri.clone(),
        };
        let action = match (kind, existing.is_some()) {
            (EngagementKind::Like, false) => EngagementAction::Like,
            (EngagementKind::Like, true) => EngagementAction::Unlike,
            (EngagementKind::Repost, false) => EngagementAction::Repost,
            (EngagementKind::Repost, true) => EngagementAction::Unrepost,
        };

        let source = Rc::clone(&self.source);
        let events = self.events.clone();
        tokio::task::spawn_local(async move {
            let result = perform(&*source, &item, action, existing.as_deref()).await;
            events.send(Event::Engaged {
                item_id: item.id,
                action,
                result: result.map_err(|e| format!("{e:#}")),
            });
        });
    }

    fn engaged(&mut self, item_id: String, action: EngagementAction, result: Result<Option<String>, String>) {
        self.pending.remove(&(item_id.clone(), action.kind()));

        let uri = match result {
            Ok(uri) => uri,
            Err(message) => {
                tracing::warn!("{action:?} failed for {item_id}: {message}");
                self.presenter.notice(&format!("{action:?} failed: {message}"));
                return;
            }
        };

        let records = self.records.entry(item_id.clone()).or_default();
        match action.kind() {
            EngagementKind::Like => records.like_uri = uri,
            EngagementKind::Repost => records.repost_uri = uri,
        }
        tracing::debug!("{action:?} done for {item_id}");

        if let Some(overlay) = self.overlay.as_ref().filter(|o| o.item.id == item_id) {
            let state = self.engagement_state(&item_id);
            self.presenter.overlay(overlay, state);
        }
    }

    fn engagement_state(&self, item_id: &str) -> EngagementState {
        self.records
            .get(item_id)
            .map(|r| EngagementState {
                liked: r.like_uri.is_some(),
                reposted: r.repost_uri.is_some(),
            })
            .unwrap_or_default()
    }

    /// Execute the player's pending effects
    fn flush(&mut self) {
        for effect in self.player.take_effects() {
            match effect {
                Effect::Fetch {
                    generation,
                    reason,
                    plan,
                } => {
                    let source = Rc::clone(&self.source);
                    let events = self.events.clone();
                    tokio::task::spawn_local(async move {
                        let outcome = aggregator::fetch(&*source, &plan).await;
                        events.send(Event::Fetched {
                            generation,
                            reason,
                            outcome,
                        });
                    });
                }
                Effect::Animate(animation) => {
                    self.presenter.animate(&animation);
                    let events = self.events.clone();
                    tokio::task::spawn_local(async move {
                        tokio::time::sleep(animation.duration).await;
                        events.send(Event::TransitionFinished(animation.token));
                    });
                }
                Effect::Overlay(overlay) => {
                    let state = self.engagement_state(&overlay.item.id);
                    self.presenter.overlay(&overlay, state);
                    self.overlay = Some(overlay);
                }
                Effect::Status(status) => self.presenter.status(&status),
            }
        }
    }
}

async fn perform<S: EngagementApi>(
    source: &S,
    item: &QueueItem,
    action: EngagementAction,
    existing: Option<&str>,
) -> anyhow::Result<Option<String>> {
    match (action, existing) {
        (EngagementAction::Like, _) => source.like(item).await.map(Some),
        (EngagementAction::Repost, _) => source.repost(item).await.map(Some),
        (EngagementAction::Unlike, Some(uri)) => source.unlike(uri).await.map(|()| None),
        (EngagementAction::Unrepost, Some(uri)) => source.unrepost(uri).await.map(|()| None),
        (EngagementAction::Unlike | EngagementAction::Unrepost, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::*;
    use crate::api::Page;
    use crate::media::{MediaEventKind, SimulatedBackend};
    use crate::seen::{SeenConfig, SeenStore};
    use crate::storage::MemoryStore;
    use crate::tv::TvSettings;
    use crate::tv::session::SessionState;
    use crate::tv::testing::{FakeSource, video};

    #[derive(Debug, Default)]
    struct Screen {
        animations: Vec<SlideAnimation>,
        overlays: Vec<(String, EngagementState)>,
        statuses: Vec<Status>,
        destinations: Vec<Destination>,
        notices: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct RecordingPresenter(Rc<RefCell<Screen>>);

    impl Presenter for RecordingPresenter {
        fn animate(&mut self, animation: &SlideAnimation) {
            self.0.borrow_mut().animations.push(animation.clone());
        }

        fn overlay(&mut self, overlay: &Overlay, engagement: EngagementState) {
            self.0
                .borrow_mut()
                .overlays
                .push((overlay.item.id.clone(), engagement));
        }

        fn status(&mut self, status: &Status) {
            self.0.borrow_mut().statuses.push(status.clone());
        }

        fn navigate(&mut self, destination: &Destination) {
            self.0.borrow_mut().destinations.push(destination.clone());
        }

        fn notice(&mut self, message: &str) {
            self.0.borrow_mut().notices.push(message.to_string());
        }
    }

    type TestDriver =
        Driver<FakeSource, SimulatedBackend<EventSender>, MemoryStore, RecordingPresenter>;

    fn driver(source: FakeSource, screen: &RecordingPresenter) -> TestDriver {
        let (events, rx) = channel();
        let backend = SimulatedBackend::new(events.clone());
        let seen = SeenStore::open(MemoryStore::new(), SeenConfig::tv(100));
        let player = Player::new(backend, seen, TvSettings::default());
        Driver::new(player, Rc::new(source), screen.clone(), events, rx)
    }

    fn source_with(ids: &[&str]) -> FakeSource {
        let source = FakeSource::new();
        source.push_timeline(Ok(Page::new(ids.iter().map(|id| video(id)).collect(), None)));
        source
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    /// Handle every event that arrives within `window`
    async fn pump(driver: &mut TestDriver, window: Duration) {
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, driver.rx.recv()).await {
            driver.handle(event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_plays_and_navigates() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let mut driver = driver(source_with(&["a", "b", "c"]), &screen);
                driver.handle(Event::Command(Command::Start { topic: None }));
                pump(&mut driver, Duration::from_secs(1)).await;

                assert_eq!(driver.player().state(), SessionState::Playing);
                assert_eq!(driver.player().current_item().unwrap().id, "a");

                driver.handle(Event::Command(Command::Next));
                pump(&mut driver, Duration::from_secs(1)).await;
                assert_eq!(driver.player().current_item().unwrap().id, "b");

                let screen = screen.0.borrow();
                assert_eq!(screen.statuses[0], Status::Loading { topic: None });
                assert_eq!(screen.animations.len(), 1);
                let shown: Vec<&str> = screen.overlays.iter().map(|(id, _)| id.as_str()).collect();
                assert_eq!(shown.first(), Some(&"a"));
                assert_eq!(shown.last(), Some(&"b"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_advances_after_clip_ends() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let source = FakeSource::new();
                let mut first = video("a");
                first.media.duration_hint = Some(6.0);
                source.push_timeline(Ok(Page::new(vec![first, video("b")], None)));
                let mut driver = driver(source, &screen);

                driver.handle(Event::Command(Command::Start { topic: None }));
                pump(&mut driver, Duration::from_secs(8)).await;

                assert_eq!(driver.player().current_item().unwrap().id, "b");
                assert!(driver.player().seen().has("a"));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_like_toggles_record() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let mut driver = driver(source_with(&["a", "b"]), &screen);
                driver.handle(Event::Command(Command::Start { topic: None }));
                pump(&mut driver, Duration::from_secs(1)).await;

                driver.handle(Event::Command(Command::ToggleLike));
                driver.handle(Event::Command(Command::ToggleLike));
                pump(&mut driver, Duration::from_millis(10)).await;
                driver.handle(Event::Command(Command::ToggleLike));
                pump(&mut driver, Duration::from_millis(10)).await;

                assert_eq!(
                    driver.source.engagement_calls(),
                    vec![
                        "like:a".to_string(),
                        "unlike:at://did:plc:me/app.bsky.feed.like/a".to_string()
                    ]
                );
                let screen = screen.0.borrow();
                let states: Vec<bool> = screen.overlays.iter().map(|(_, s)| s.liked).collect();
                assert_eq!(states.last(), Some(&false));
                assert!(states.contains(&true));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_engagement_shows_notice() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let source = source_with(&["a"]);
                source.fail_engagement();
                let mut driver = driver(source, &screen);
                driver.handle(Event::Command(Command::Start { topic: None }));
                pump(&mut driver, Duration::from_secs(1)).await;

                driver.handle(Event::Command(Command::ToggleRepost));
                pump(&mut driver, Duration::from_millis(10)).await;

                let screen = screen.0.borrow();
                assert_eq!(screen.notices.len(), 1);
                assert!(screen.overlays.iter().all(|(_, s)| !s.reposted));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_thread_pauses() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let mut driver = driver(source_with(&["a"]), &screen);
                driver.handle(Event::Command(Command::Start { topic: None }));
                pump(&mut driver, Duration::from_secs(1)).await;

                driver.handle(Event::Command(Command::OpenThread));
                assert_eq!(driver.player().state(), SessionState::Paused);
                let screen = screen.0.borrow();
                assert!(matches!(
                    screen.destinations.as_slice(),
                    [Destination::Thread { uri, .. }] if uri == "a"
                ));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_fetch_ignores_late_result() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let mut driver = driver(source_with(&["a", "b"]), &screen);
                driver.handle(Event::Command(Command::Start { topic: None }));
                driver.handle(Event::Command(Command::Stop));
                pump(&mut driver, Duration::from_secs(1)).await;

                assert_eq!(driver.player().state(), SessionState::Stopped);
                assert!(driver.player().queue().is_empty());
                assert_eq!(screen.0.borrow().statuses.last(), Some(&Status::Stopped));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_shutdown() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let driver = driver(source_with(&["a", "b"]), &screen);
                let sender = driver.sender();
                sender.command(Command::Start {
                    topic: Some("cats".to_string()),
                });
                let task = tokio::task::spawn_local(driver.run());
                settle().await;
                sender.command(Command::Shutdown);

                let driver = task.await.unwrap();
                assert_eq!(driver.player().state(), SessionState::Stopped);
                assert_eq!(
                    driver.source.search_calls().first().map(|(q, _)| q.as_str()),
                    Some("#cats")
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_events_for_stopped_session_dropped() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let screen = RecordingPresenter::default();
                let mut driver = driver(source_with(&["a"]), &screen);
                driver.handle(Event::Command(Command::Start { topic: None }));
                pump(&mut driver, Duration::from_secs(1)).await;
                let session = driver
                    .player()
                    .slots()
                    .slot(driver.player().slots().active())
                    .session
                    .unwrap();

                driver.handle(Event::Command(Command::Stop));
                driver.handle(Event::Media(MediaEvent::new(session, MediaEventKind::Ended)));
                assert_eq!(driver.player().state(), SessionState::Stopped);
                assert_eq!(driver.player().current_index(), None);
            })
            .await;
    }
}

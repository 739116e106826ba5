//! Timer-driven media backend for the terminal build and the demo.
//!
//! Each session is a local task that "loads" for a short delay, reports
//! metadata, then advances a playhead while playing. Must be used from
//! inside a `tokio::task::LocalSet`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;

use super::{MediaBackend, MediaEvent, MediaEventKind, MediaEventSink, SessionHandle};
use crate::models::MediaRef;

/// Streams whose URL carries this fragment fail after loading
pub const FAIL_MARKER: &str = "#simulate-error";

#[derive(Debug)]
struct Playhead {
    playing: bool,
    rate: f64,
    muted: bool,
    position: Duration,
}

impl Default for Playhead {
    fn default() -> Self {
        Self {
            playing: false,
            rate: 1.0,
            muted: true,
            position: Duration::ZERO,
        }
    }
}

struct SimSession {
    playhead: Rc<RefCell<Playhead>>,
    task: JoinHandle<()>,
}

/// Backend that simulates playback with timers
pub struct SimulatedBackend<S: MediaEventSink + Clone + 'static> {
    sink: S,
    sessions: HashMap<SessionHandle, SimSession>,
    load_delay: Duration,
    tick: Duration,
}

impl<S: MediaEventSink + Clone + 'static> SimulatedBackend<S> {
    /// Create a backend reporting to `sink`
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            sessions: HashMap::new(),
            load_delay: Duration::from_millis(150),
            tick: Duration::from_millis(100),
        }
    }

    /// Number of live sessions
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Current playhead position of a session
    pub fn position(&self, session: SessionHandle) -> Option<Duration> {
        self.sessions
            .get(&session)
            .map(|s| s.playhead.borrow().position)
    }

    /// Whether a session is muted
    pub fn is_muted(&self, session: SessionHandle) -> Option<bool> {
        self.sessions.get(&session).map(|s| s.playhead.borrow().muted)
    }

    fn with_playhead(&self, session: SessionHandle, f: impl FnOnce(&mut Playhead)) {
        match self.sessions.get(&session) {
            Some(s) => f(&mut s.playhead.borrow_mut()),
            None => tracing::debug!("Ignoring command for released {session}"),
        }
    }
}

async fn run_session<S: MediaEventSink>(
    session: SessionHandle,
    duration: f64,
    fails: bool,
    playhead: Rc<RefCell<Playhead>>,
    sink: S,
    load_delay: Duration,
    tick: Duration,
) {
    tokio::time::sleep(load_delay).await;

    if fails {
        sink.emit(MediaEvent::new(
            session,
            MediaEventKind::Error {
                fatal: true,
                detail: "simulated network error".to_string(),
            },
        ));
        return;
    }

    sink.emit(MediaEvent::new(
        session,
        MediaEventKind::Metadata {
            duration: Some(duration),
        },
    ));
    sink.emit(MediaEvent::new(session, MediaEventKind::Ready));

    let total = Duration::from_secs_f64(duration);
    let mut ticker = tokio::time::interval(tick);
    loop {
        ticker.tick().await;
        let finished = {
            let mut head = playhead.borrow_mut();
            if head.playing {
                let step = tick.mul_f64(head.rate);
                head.position += step;
            }
            head.position >= total
        };
        if finished {
            sink.emit(MediaEvent::new(session, MediaEventKind::Ended));
            return;
        }
    }
}

impl<S: MediaEventSink + Clone + 'static> MediaBackend for SimulatedBackend<S> {
    fn open(&mut self, session: SessionHandle, media: &MediaRef) {
        let duration = media
            .duration_hint
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or_else(|| rand::rng().random_range(6.0..30.0));
        let fails = media
            .stream_url
            .as_deref()
            .is_some_and(|url| url.ends_with(FAIL_MARKER));

        let playhead = Rc::new(RefCell::new(Playhead::default()));
        let task = tokio::task::spawn_local(run_session(
            session,
            duration,
            fails,
            Rc::clone(&playhead),
            self.sink.clone(),
            self.load_delay,
            self.tick,
        ));

        tracing::debug!("Opened {session} ({duration:.1}s)");
        if let Some(previous) = self.sessions.insert(session, SimSession { playhead, task }) {
            previous.task.abort();
        }
    }

    fn destroy(&mut self, session: SessionHandle) {
        if let Some(s) = self.sessions.remove(&session) {
            s.task.abort();
            tracing::debug!("Destroyed {session}");
        }
    }

    fn play(&mut self, session: SessionHandle) {
        self.with_playhead(session, |head| head.playing = true);
    }

    fn pause(&mut self, session: SessionHandle) {
        self.with_playhead(session, |head| head.playing = false);
    }

    fn set_muted(&mut self, session: SessionHandle, muted: bool) {
        self.with_playhead(session, |head| head.muted = muted);
    }

    fn set_rate(&mut self, session: SessionHandle, rate: f64) {
        self.with_playhead(session, |head| head.rate = rate);
    }
}

impl<S: MediaEventSink + Clone + 'static> Drop for SimulatedBackend<S> {
    fn drop(&mut self) {
        for (_, s) in self.sessions.drain() {
            s.task.abort();
        }
    }
}

//! Interactive terminal front end

mod events;
mod ui;

pub use events::KeyMapper;
pub use ui::{ConsolePresenter, fit, overlay_lines};

use std::io::stdout;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    cursor::{Hide, Show},
    event::{
        self, Event as TermEvent, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    execute,
    terminal::{
        self, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    },
};
use tokio::runtime::Runtime;

use crate::api::{ContentSource, EngagementApi};
use crate::media::SimulatedBackend;
use crate::seen::SeenStore;
use crate::storage::KeyValueStore;
use crate::tv::driver::{self, EventSender};
use crate::tv::{Command, Driver, Player, TvSettings};

/// Run a TV session in the terminal until the user quits.
///
/// `rt` must be a current-thread runtime; the session runs on a `LocalSet`
/// inside it.
pub fn run_tv<S, K>(
    rt: &Runtime,
    source: S,
    seen: SeenStore<K>,
    settings: TvSettings,
    topic: Option<String>,
) -> Result<()>
where
    S: ContentSource + EngagementApi + 'static,
    K: KeyValueStore + 'static,
{
    let local = tokio::task::LocalSet::new();
    let (events, rx) = driver::channel();

    let interrupt = events.clone();
    ctrlc::set_handler(move || interrupt.command(Command::Shutdown))?;

    // Initialize terminal
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, Hide)?;
    let release_events = matches!(terminal::supports_keyboard_enhancement(), Ok(true));
    if release_events {
        execute!(
            out,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )?;
    }

    let stop_input = Arc::new(AtomicBool::new(false));
    let input = spawn_input(events.clone(), release_events, Arc::clone(&stop_input));

    local.block_on(rt, async move {
        let backend = SimulatedBackend::new(events.clone());
        let player = Player::new(backend, seen, settings);
        let driver = Driver::new(player, Rc::new(source), ConsolePresenter::new(), events, rx);
        driver.sender().command(Command::Start { topic });
        let driver = driver.run().await;
        tracing::debug!("Watched {} items", driver.player().seen().len());
    });

    stop_input.store(true, Ordering::Relaxed);
    if input.join().is_err() {
        tracing::warn!("Input thread panicked");
    }

    // Restore terminal
    if release_events {
        execute!(out, PopKeyboardEnhancementFlags)?;
    }
    execute!(out, Show, LeaveAlternateScreen)?;
    disable_raw_mode()?;

    Ok(())
}

/// Read keys on a plain thread and forward them as commands
fn spawn_input(sender: EventSender, release_events: bool, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut keys = KeyMapper::new(release_events);
        while !stop.load(Ordering::Relaxed) {
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Failed to poll input: {e}");
                    break;
                }
            }

            match event::read() {
                Ok(TermEvent::Key(key)) => {
                    if let Some(command) = keys.handle_key(key) {
                        let quit = command == Command::Shutdown;
                        sender.command(command);
                        if quit {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Failed to read input: {e}");
                    break;
                }
            }
        }
    })
}

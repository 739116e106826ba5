//! Key handling

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::tv::Command;

/// Translates key events into driver commands.
///
/// Fast-forward is held for as long as `f` is down when the terminal reports
/// key releases; otherwise each press toggles it.
#[derive(Debug, Default)]
pub struct KeyMapper {
    release_events: bool,
    holding: bool,
}

impl KeyMapper {
    /// Create a mapper; `release_events` says whether the terminal reports
    /// key releases
    pub const fn new(release_events: bool) -> Self {
        Self {
            release_events,
            holding: false,
        }
    }

    /// Map a key event, returning the command to send (if any)
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        match key.kind {
            KeyEventKind::Release => return self.handle_release(key),
            KeyEventKind::Repeat if key.code == KeyCode::Char('f') => return None,
            KeyEventKind::Press | KeyEventKind::Repeat => {}
        }

        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q') | KeyCode::Esc) => {
                Some(Command::Shutdown)
            }
            (_, KeyCode::Char('j') | KeyCode::Down) => Some(Command::Next),
            (_, KeyCode::Char('k') | KeyCode::Up) => Some(Command::Previous),
            (_, KeyCode::Char(' ')) => Some(Command::TogglePause),
            (_, KeyCode::Char('f')) => self.handle_hold(),
            (_, KeyCode::Char('l')) => Some(Command::ToggleLike),
            (_, KeyCode::Char('b')) => Some(Command::ToggleRepost),
            (_, KeyCode::Char('p')) => Some(Command::OpenProfile),
            (_, KeyCode::Char('t')) => Some(Command::OpenThread),
            _ => None,
        }
    }

    fn handle_hold(&mut self) -> Option<Command> {
        if self.release_events {
            if self.holding {
                return None;
            }
            self.holding = true;
            return Some(Command::HoldStart);
        }

        self.holding = !self.holding;
        Some(if self.holding {
            Command::HoldStart
        } else {
            Command::HoldEnd
        })
    }

    fn handle_release(&mut self, key: KeyEvent) -> Option<Command> {
        if key.code == KeyCode::Char('f') && self.holding {
            self.holding = false;
            return Some(Command::HoldEnd);
        }
        None
    }
}

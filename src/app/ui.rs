//! Terminal rendering of the TV overlay

use std::io::{self, Stdout, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Print, Stylize},
    terminal::{self, Clear, ClearType},
};
use textwrap::{Options as WrapOptions, wrap};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::tv::driver::{Destination, EngagementState};
use crate::tv::transition::{Direction, SlideAnimation};
use crate::tv::{Overlay, Presenter, Status};

const KEY_HELP: &str = "j/k next/prev · space pause · f fast · l like · b repost · p profile · t thread · q quit";

/// Truncate `text` to `width` display columns, ending in '…' when cut
pub fn fit(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// Lines of the overlay for a terminal `width` columns wide
pub fn overlay_lines(overlay: &Overlay, engagement: EngagementState, width: usize) -> Vec<String> {
    let item = &overlay.item;
    let width = width.max(20);
    let mut lines = Vec::new();

    let mut header = format!("{} @{}", item.author_name(), item.author_handle);
    if !item.author_handle.is_empty() {
        header.push_str(&format!(" · {}", item.relative_time()));
    }
    lines.push(fit(&header, width));

    let text_width = width.saturating_sub(2).max(10);
    for line in wrap(&item.text, WrapOptions::new(text_width)) {
        lines.push(format!("  {line}"));
    }

    let heart = if engagement.liked { "♥" } else { "♡" };
    let repost = if engagement.reposted { "⟳ reposted" } else { "⟳" };
    let mut meta = format!(
        "{heart} {}  {repost} {}  [{}/{}]",
        item.like_count,
        item.repost_count,
        overlay.index + 1,
        overlay.queued
    );
    if overlay.paused {
        meta.push_str("  ⏸ paused");
    }
    if overlay.fast_forward {
        meta.push_str("  ⏩ 2x");
    }
    lines.push(fit(&meta, width));
    lines
}

/// Presenter drawing into the alternate screen
pub struct ConsolePresenter {
    out: Stdout,
    status: Option<String>,
    notice: Option<String>,
    body: Vec<String>,
}

impl ConsolePresenter {
    /// Draw to stdout
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            status: None,
            notice: None,
            body: Vec::new(),
        }
    }

    fn width() -> usize {
        terminal::size().map_or(80, |(w, _)| usize::from(w))
    }

    fn render(&mut self) {
        if let Err(e) = self.draw() {
            tracing::warn!("Failed to draw: {e}");
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        let width = Self::width();
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        queue!(self.out, Print("📺 perch tv".bold()), Print("\r\n\r\n"))?;

        for line in &self.body {
            queue!(self.out, Print(line), Print("\r\n"))?;
        }
        if let Some(status) = &self.status {
            queue!(self.out, Print("\r\n"), Print(fit(status, width).yellow()), Print("\r\n"))?;
        }
        if let Some(notice) = &self.notice {
            queue!(self.out, Print(fit(notice, width).red()), Print("\r\n"))?;
        }
        queue!(self.out, Print("\r\n"), Print(fit(KEY_HELP, width).dark_grey()))?;
        self.out.flush()
    }
}

impl Default for ConsolePresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Presenter for ConsolePresenter {
    fn animate(&mut self, animation: &SlideAnimation) {
        let arrow = match animation.direction {
            Direction::Forward => "▼",
            Direction::Backward => "▲",
        };
        self.body = vec![format!("{arrow} ...")];
        self.notice = None;
        self.render();
    }

    fn overlay(&mut self, overlay: &Overlay, engagement: EngagementState) {
        self.body = overlay_lines(overlay, engagement, Self::width());
        self.status = None;
        self.render();
    }

    fn status(&mut self, status: &Status) {
        self.status = Some(status.to_string());
        if matches!(status, Status::Stopped) {
            self.body.clear();
        }
        self.render();
    }

    fn navigate(&mut self, destination: &Destination) {
        let url = match destination {
            Destination::Profile { url, .. } | Destination::Thread { url, .. } => url,
        };
        match open::that(url) {
            Ok(()) => self.notice = Some(format!("Opened {url} (paused)")),
            Err(e) => {
                tracing::warn!("Failed to open {url}: {e}");
                self.notice = Some(format!("Couldn't open {url}"));
            }
        }
        self.render();
    }

    fn notice(&mut self, message: &str) {
        self.notice = Some(message.to_string());
        self.render();
    }
}

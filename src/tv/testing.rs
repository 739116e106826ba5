//! Scripted sources and a recording media backend for tests

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use anyhow::{Result, bail};

use crate::api::{ContentSource, EngagementApi, Page, SearchSort};
use crate::media::{MediaBackend, SessionHandle};
use crate::models::{MediaRef, QueueItem};

/// Playable item with a stream URL derived from its id
pub fn video(id: &str) -> QueueItem {
    let mut item = QueueItem::new(
        id,
        MediaRef::stream(format!("https://video.bsky.app/watch/{id}/playlist.m3u8")),
    );
    item.cid = Some(format!("cid-{id}"));
    item.author_handle = "author.bsky.social".to_string();
    item
}

/// Playable item with a known duration
pub fn video_with_duration(id: &str, seconds: f64) -> QueueItem {
    let mut item = video(id);
    item.media.duration_hint = Some(seconds);
    item
}

#[derive(Default)]
struct Script {
    search: HashMap<String, VecDeque<Result<Page>>>,
    timeline: VecDeque<Result<Page>>,
    feed: VecDeque<Result<Page>>,
    search_calls: Vec<(String, Option<String>)>,
    timeline_cursors: Vec<Option<String>>,
    engagement: Vec<String>,
    fail_engagement: bool,
}

/// Content source answering from queued responses; runs dry into empty pages
#[derive(Default)]
pub struct FakeSource {
    script: RefCell<Script>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_search(&self, query: &str, response: Result<Page>) {
        self.script
            .borrow_mut()
            .search
            .entry(query.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn push_timeline(&self, response: Result<Page>) {
        self.script.borrow_mut().timeline.push_back(response);
    }

    pub fn push_feed(&self, response: Result<Page>) {
        self.script.borrow_mut().feed.push_back(response);
    }

    /// Search queries with their cursors, in call order
    pub fn search_calls(&self) -> Vec<(String, Option<String>)> {
        self.script.borrow().search_calls.clone()
    }

    /// Cursors passed to the timeline, in call order
    pub fn timeline_cursors(&self) -> Vec<Option<String>> {
        self.script.borrow().timeline_cursors.clone()
    }

    /// Engagement calls as "like:<id>", "unlike:<uri>" and so on
    pub fn engagement_calls(&self) -> Vec<String> {
        self.script.borrow().engagement.clone()
    }

    pub fn fail_engagement(&self) {
        self.script.borrow_mut().fail_engagement = true;
    }

    fn record_engagement(&self, call: String) -> Result<()> {
        let mut script = self.script.borrow_mut();
        if script.fail_engagement {
            bail!("Failed to {call}: 502 Bad Gateway");
        }
        script.engagement.push(call);
        Ok(())
    }
}

impl ContentSource for FakeSource {
    async fn search_posts(
        &self,
        query: &str,
        _sort: SearchSort,
        _limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let mut script = self.script.borrow_mut();
        script
            .search_calls
            .push((query.to_string(), cursor.map(str::to_string)));
        script
            .search
            .get_mut(query)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn timeline(&self, _limit: usize, cursor: Option<&str>) -> Result<Page> {
        let mut script = self.script.borrow_mut();
        script.timeline_cursors.push(cursor.map(str::to_string));
        script
            .timeline
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }

    async fn feed(&self, _feed_uri: &str, _limit: usize) -> Result<Page> {
        self.script
            .borrow_mut()
            .feed
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}

impl EngagementApi for FakeSource {
    async fn like(&self, item: &QueueItem) -> Result<String> {
        self.record_engagement(format!("like:{}", item.id))?;
        Ok(format!("at://did:plc:me/app.bsky.feed.like/{}", item.id))
    }

    async fn unlike(&self, like_uri: &str) -> Result<()> {
        self.record_engagement(format!("unlike:{like_uri}"))
    }

    async fn repost(&self, item: &QueueItem) -> Result<String> {
        self.record_engagement(format!("repost:{}", item.id))?;
        Ok(format!("at://did:plc:me/app.bsky.feed.repost/{}", item.id))
    }

    async fn unrepost(&self, repost_uri: &str) -> Result<()> {
        self.record_engagement(format!("unrepost:{repost_uri}"))
    }
}

#[derive(Debug, Default)]
struct Record {
    opened: Vec<(SessionHandle, Option<String>)>,
    destroyed: Vec<SessionHandle>,
    live: BTreeSet<SessionHandle>,
    playing: BTreeSet<SessionHandle>,
    paused: Vec<SessionHandle>,
    unmuted: BTreeSet<SessionHandle>,
    rates: BTreeMap<SessionHandle, f64>,
}

/// Media backend that only records what it was asked to do.
///
/// Clones share one record, so a test can keep a handle while the slot
/// manager owns the backend.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend(Rc<RefCell<Record>>);

impl FakeBackend {
    pub fn opened(&self) -> Vec<SessionHandle> {
        self.0.borrow().opened.iter().map(|(s, _)| *s).collect()
    }

    /// Stream URL a session was opened with
    pub fn url(&self, session: SessionHandle) -> Option<String> {
        self.0
            .borrow()
            .opened
            .iter()
            .find(|(s, _)| *s == session)
            .and_then(|(_, url)| url.clone())
    }

    pub fn destroyed(&self) -> Vec<SessionHandle> {
        self.0.borrow().destroyed.clone()
    }

    pub fn live(&self) -> Vec<SessionHandle> {
        self.0.borrow().live.iter().copied().collect()
    }

    /// Live sessions currently playing
    pub fn playing(&self) -> Vec<SessionHandle> {
        self.0.borrow().playing.iter().copied().collect()
    }

    /// Every pause request, in order
    pub fn paused(&self) -> Vec<SessionHandle> {
        self.0.borrow().paused.clone()
    }

    pub fn is_muted(&self, session: SessionHandle) -> bool {
        !self.0.borrow().unmuted.contains(&session)
    }

    pub fn rate(&self, session: SessionHandle) -> Option<f64> {
        self.0.borrow().rates.get(&session).copied()
    }
}

impl MediaBackend for FakeBackend {
    fn open(&mut self, session: SessionHandle, media: &MediaRef) {
        let mut record = self.0.borrow_mut();
        record.opened.push((session, media.stream_url.clone()));
        record.live.insert(session);
    }

    fn destroy(&mut self, session: SessionHandle) {
        let mut record = self.0.borrow_mut();
        record.destroyed.push(session);
        record.live.remove(&session);
        record.playing.remove(&session);
    }

    fn play(&mut self, session: SessionHandle) {
        let mut record = self.0.borrow_mut();
        if record.live.contains(&session) {
            record.playing.insert(session);
        }
    }

    fn pause(&mut self, session: SessionHandle) {
        let mut record = self.0.borrow_mut();
        record.paused.push(session);
        record.playing.remove(&session);
    }

    fn set_muted(&mut self, session: SessionHandle, muted: bool) {
        let mut record = self.0.borrow_mut();
        if muted {
            record.unmuted.remove(&session);
        } else {
            record.unmuted.insert(session);
        }
    }

    fn set_rate(&mut self, session: SessionHandle, rate: f64) {
        self.0.borrow_mut().rates.insert(session, rate);
    }
}

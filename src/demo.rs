//! Offline content source for `perch-tv demo`.
//!
//! Produces deterministic pages of synthetic video posts, sprinkled with the
//! candidates the player has to cope with: clips that are too short, posts
//! without a stream, animated GIFs, adult-labelled posts and streams that
//! fail while loading.

use std::cell::RefCell;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;

use crate::api::{ContentSource, EngagementApi, Page, SearchSort};
use crate::media::FAIL_MARKER;
use crate::models::{MediaRef, QueueItem};

const CREATORS: &[(&str, &str)] = &[
    ("harbor.demo.bsky.social", "Harbor Lights"),
    ("fernweh.demo.bsky.social", "Fernweh"),
    ("tinkerer.demo.bsky.social", "The Tinkerer"),
    ("quietpaws.demo.bsky.social", "Quiet Paws"),
    ("orbit.demo.bsky.social", "Low Orbit"),
];

const CAPTIONS: &[&str] = &[
    "Morning light over the water",
    "Trying this again in slow motion",
    "Fifteen seconds of pure calm",
    "You have to hear the sound on this one",
    "Shot this on the way home",
    "Part two, as promised",
];

const CLIP_LENGTHS: &[f64] = &[6.0, 9.5, 7.0, 12.0, 8.0, 15.0, 10.0];

/// How many pages each paginated source serves before running dry
const PAGES: usize = 4;

/// Network latency of every call
const LATENCY: Duration = Duration::from_millis(250);

/// What kind of candidate to generate at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Clip,
    TooShort,
    NoStream,
    Gif,
    Adult,
    Broken,
}

fn variant(n: usize) -> Variant {
    match n % 11 {
        3 => Variant::TooShort,
        5 => Variant::NoStream,
        7 => Variant::Gif,
        8 => Variant::Adult,
        10 => Variant::Broken,
        _ => Variant::Clip,
    }
}

/// Synthetic source
#[derive(Debug, Default)]
pub struct DemoSource {
    engagement: RefCell<Vec<String>>,
}

impl DemoSource {
    /// Create a source with an empty engagement log
    pub fn new() -> Self {
        Self::default()
    }

    /// Engagement calls made so far
    pub fn engagement_log(&self) -> Vec<String> {
        self.engagement.borrow().clone()
    }

    fn item(scope: &str, n: usize, topic: Option<&str>) -> QueueItem {
        let (handle, name) = CREATORS[n % CREATORS.len()];
        let rkey = format!("{scope}{n:04}");
        let did = format!("did:plc:demo{}", n % CREATORS.len());
        let stream = format!("https://video.demo.invalid/{did}/{rkey}/playlist.m3u8");

        let media = match variant(n) {
            Variant::Clip | Variant::Adult => MediaRef {
                stream_url: Some(stream),
                thumbnail_url: Some(format!("https://video.demo.invalid/{did}/{rkey}/thumbnail.jpg")),
                duration_hint: Some(CLIP_LENGTHS[n % CLIP_LENGTHS.len()]),
            },
            Variant::TooShort => MediaRef {
                stream_url: Some(stream),
                thumbnail_url: None,
                duration_hint: Some(2.5),
            },
            Variant::NoStream => MediaRef::default(),
            Variant::Gif => MediaRef::stream(format!("https://media.demo.invalid/{rkey}.gif")),
            Variant::Broken => MediaRef::stream(format!("{stream}{FAIL_MARKER}")),
        };

        let mut item = QueueItem::new(format!("at://{did}/app.bsky.feed.post/{rkey}"), media);
        item.cid = Some(format!("bafydemo{rkey}"));
        item.author_id = did;
        item.author_handle = handle.to_string();
        item.author_display_name = name.to_string();
        item.text = match topic {
            Some(topic) => format!("{} #{topic}", CAPTIONS[n % CAPTIONS.len()]),
            None => CAPTIONS[n % CAPTIONS.len()].to_string(),
        };
        item.created_at = Utc::now() - chrono::Duration::minutes(i64::try_from(n * 17).unwrap_or(0));
        item.like_count = u32::try_from((n * 37) % 400).unwrap_or(0);
        item.repost_count = u32::try_from((n * 11) % 90).unwrap_or(0);
        if variant(n) == Variant::Adult {
            item.labels.insert("porn".to_string());
        }
        item
    }

    /// One page of a paginated scope; cursors are page numbers
    fn page(scope: &str, limit: usize, cursor: Option<&str>, topic: Option<&str>) -> Result<Page> {
        let page = match cursor {
            Some(cursor) => match cursor.parse::<usize>() {
                Ok(page) => page,
                Err(_) => bail!("Invalid cursor: {cursor}"),
            },
            None => 0,
        };
        if page >= PAGES {
            return Ok(Page::default());
        }

        let start = page * limit;
        let items = (start..start + limit)
            .map(|n| Self::item(scope, n, topic))
            .collect();
        let next = (page + 1 < PAGES).then(|| (page + 1).to_string());
        Ok(Page::new(items, next))
    }

    fn log(&self, entry: String) {
        tracing::debug!("Demo engagement: {entry}");
        self.engagement.borrow_mut().push(entry);
    }
}

impl ContentSource for DemoSource {
    async fn search_posts(
        &self,
        query: &str,
        sort: SearchSort,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page> {
        tokio::time::sleep(LATENCY).await;
        let topic = query.trim_start_matches('#');
        match sort {
            // Top results overlap the first text page, exercising dedup
            SearchSort::Top => Self::page("t", limit / 2, None, Some(topic)),
            SearchSort::Latest => Self::page("t", limit, cursor, Some(topic)),
        }
    }

    async fn timeline(&self, limit: usize, cursor: Option<&str>) -> Result<Page> {
        tokio::time::sleep(LATENCY).await;
        Self::page("h", limit, cursor, None)
    }

    async fn feed(&self, _feed_uri: &str, limit: usize) -> Result<Page> {
        tokio::time::sleep(LATENCY).await;
        let mut page = Self::page("d", limit, None, None)?;
        page.cursor = None;
        Ok(page)
    }
}

impl EngagementApi for DemoSource {
    async fn like(&self, item: &QueueItem) -> Result<String> {
        self.log(format!("like {}", item.id));
        Ok(format!("at://did:plc:viewer/app.bsky.feed.like/{}", item.rkey()))
    }

    async fn unlike(&self, like_uri: &str) -> Result<()> {
        self.log(format!("unlike {like_uri}"));
        Ok(())
    }

    async fn repost(&self, item: &QueueItem) -> Result<String> {
        self.log(format!("repost {}", item.id));
        Ok(format!("at://did:plc:viewer/app.bsky.feed.repost/{}", item.rkey()))
    }

    async fn unrepost(&self, repost_uri: &str) -> Result<()> {
        self.log(format!("unrepost {repost_uri}"));
        Ok(())
    }
}

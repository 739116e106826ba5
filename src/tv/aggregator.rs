//! Candidate source aggregation.
//!
//! A fetch is split in two halves so the player can run the network part as
//! a background task: [`fetch`] talks to the sources (in parallel, each
//! failure tolerated on its own) and [`merge`] filters the results into the
//! queue. [`fetch_more`] runs both back to back.

use anyhow::Result;

use crate::api::{ContentSource, Page, SearchSort};
use crate::models::QueueItem;
use crate::seen::SeenStore;
use crate::storage::KeyValueStore;

use super::TvSettings;
use super::queue::{Queue, SourceKind};

/// Everything one fetch needs, captured up front so it can outlive a borrow
/// of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Topic filter (without a leading '#')
    pub topic: Option<String>,
    /// Items per source call
    pub page_size: usize,
    /// Algorithmic feed URI
    pub discover_feed: String,
    /// Timeline continuation
    pub timeline_cursor: Option<String>,
    /// Text search continuation
    pub text_cursor: Option<String>,
}

impl FetchPlan {
    /// Plan the next fetch for `queue`
    pub fn for_queue(queue: &Queue, topic: Option<&str>, settings: &TvSettings) -> Self {
        Self {
            topic: topic.and_then(normalize_topic),
            page_size: settings.page_size,
            discover_feed: settings.discover_feed.clone(),
            timeline_cursor: queue.cursor(SourceKind::Timeline).map(str::to_string),
            text_cursor: queue.cursor(SourceKind::TextSearch).map(str::to_string),
        }
    }

    /// Sources this plan queries, in priority order
    pub fn sources(&self) -> [SourceKind; 2] {
        if self.topic.is_some() {
            [SourceKind::TagSearch, SourceKind::TextSearch]
        } else {
            [SourceKind::Timeline, SourceKind::Discover]
        }
    }
}

/// Strip whitespace and a leading '#'; empty topics mean "no topic"
pub fn normalize_topic(topic: &str) -> Option<String> {
    let topic = topic.trim().trim_start_matches('#').trim();
    if topic.is_empty() {
        None
    } else {
        Some(topic.to_string())
    }
}

/// Result of one source call
#[derive(Debug)]
pub struct SourceBatch {
    /// Which source answered
    pub source: SourceKind,
    /// Page or failure
    pub result: Result<Page>,
}

/// Results of all source calls of one fetch, in priority order
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// One batch per queried source
    pub batches: Vec<SourceBatch>,
}

/// Content filtering policy of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentPolicy {
    /// Keep items with adult content labels
    pub allow_adult_content: bool,
}

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Already in the queue
    Duplicate,
    /// No playable media reference
    Unplayable,
    /// Carries an adult content label
    AdultContent,
    /// In the seen-set
    Seen,
}

/// What a merge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Items appended to the queue
    pub appended: usize,
    /// Candidates dropped as already queued
    pub duplicates: usize,
    /// Candidates dropped for lack of playable media
    pub unplayable: usize,
    /// Candidates dropped by the content policy
    pub adult: usize,
    /// Candidates dropped as already seen
    pub seen: usize,
    /// Sources that succeeded
    pub succeeded: Vec<SourceKind>,
    /// Sources that failed
    pub failed: Vec<SourceKind>,
    /// First failure message, for the user when nothing succeeded
    pub first_error: Option<String>,
}

impl MergeReport {
    /// Whether every queried source failed
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    fn count(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Duplicate => self.duplicates += 1,
            Rejection::Unplayable => self.unplayable += 1,
            Rejection::AdultContent => self.adult += 1,
            Rejection::Seen => self.seen += 1,
        }
    }
}

/// Query the sources for one batch of candidates.
///
/// Both calls run concurrently on the current task; the outcome lists them in
/// priority order regardless of which answered first.
pub async fn fetch<S: ContentSource>(source: &S, plan: &FetchPlan) -> FetchOutcome {
    let [first, second] = plan.sources();

    let (first_result, second_result) = match &plan.topic {
        Some(topic) => {
            let tag = format!("#{topic}");
            tokio::join!(
                source.search_posts(&tag, SearchSort::Top, plan.page_size, None),
                source.search_posts(
                    topic,
                    SearchSort::Latest,
                    plan.page_size,
                    plan.text_cursor.as_deref(),
                ),
            )
        }
        None => tokio::join!(
            source.timeline(plan.page_size, plan.timeline_cursor.as_deref()),
            source.feed(&plan.discover_feed, plan.page_size),
        ),
    };

    FetchOutcome {
        batches: vec![
            SourceBatch {
                source: first,
                result: first_result,
            },
            SourceBatch {
                source: second,
                result: second_result,
            },
        ],
    }
}

/// Decide whether a candidate may enter the queue.
///
/// Checks run in order: queued, playable, content policy, seen.
pub fn screen<K: KeyValueStore>(
    item: &QueueItem,
    queue: &Queue,
    seen: &SeenStore<K>,
    policy: ContentPolicy,
) -> Result<(), Rejection> {
    if queue.contains(&item.id) {
        return Err(Rejection::Duplicate);
    }
    if !item.media.is_resolvable() {
        return Err(Rejection::Unplayable);
    }
    if !policy.allow_adult_content && item.has_adult_label() {
        return Err(Rejection::AdultContent);
    }
    if seen.is_seen(&item.id, item.engagement()) {
        return Err(Rejection::Seen);
    }
    Ok(())
}

/// Filter fetched candidates into the queue and advance cursors of the
/// sources that answered
pub fn merge<K: KeyValueStore>(
    queue: &mut Queue,
    outcome: FetchOutcome,
    seen: &SeenStore<K>,
    policy: ContentPolicy,
) -> MergeReport {
    let mut report = MergeReport::default();

    for batch in outcome.batches {
        let page = match batch.result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!("Source {} failed: {e:#}", batch.source.name());
                report.failed.push(batch.source);
                if report.first_error.is_none() {
                    report.first_error = Some(format!("{e:#}"));
                }
                continue;
            }
        };

        report.succeeded.push(batch.source);
        queue.set_cursor(batch.source, page.cursor);

        for item in page.items {
            match screen(&item, queue, seen, policy) {
                Ok(()) => {
                    tracing::debug!("Queued {} from {}", item.id, batch.source.name());
                    queue.push(item);
                    report.appended += 1;
                }
                Err(rejection) => report.count(rejection),
            }
        }
    }

    tracing::debug!(
        "Merged batch: {} queued, {} duplicate, {} unplayable, {} adult, {} seen",
        report.appended,
        report.duplicates,
        report.unplayable,
        report.adult,
        report.seen
    );
    report
}

/// Fetch one batch and merge it into `queue`
pub async fn fetch_more<S: ContentSource, K: KeyValueStore>(
    source: &S,
    queue: &mut Queue,
    seen: &SeenStore<K>,
    topic: Option<&str>,
    settings: &TvSettings,
) -> MergeReport {
    let plan = FetchPlan::for_queue(queue, topic, settings);
    let outcome = fetch(source, &plan).await;
    merge(
        queue,
        outcome,
        seen,
        ContentPolicy {
            allow_adult_content: settings.allow_adult_content,
        },
    )
}

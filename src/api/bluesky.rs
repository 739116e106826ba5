//! Bluesky (AT Protocol) API client

use std::cell::RefCell;
use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::media::is_animated_image;
use crate::models::{MediaRef, QueueItem};

use super::{ContentSource, EngagementApi, Page, SearchSort};

/// Default PDS URL for Bluesky
pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

/// "What's Hot" feed generator, used as the algorithmic source
pub const DISCOVER_FEED_URI: &str =
    "at://did:plc:z72i7hdynmk6r22z27h6tvur/app.bsky.feed.generator/whats-hot";

/// Video CDN used when a post view lacks a playlist URL
const VIDEO_CDN: &str = "https://video.bsky.app/watch";

/// Session tokens (refreshed in place)
struct Tokens {
    access_jwt: String,
    refresh_jwt: String,
}

/// Bluesky API client
pub struct BlueskyClient {
    client: Client,
    pds_url: String,
    did: String,
    handle: String,
    tokens: RefCell<Tokens>,
}

impl BlueskyClient {
    /// Login to Bluesky using the default PDS
    pub async fn login(handle: &str, app_password: &str) -> Result<Self> {
        Self::login_with_pds(handle, app_password, DEFAULT_PDS_URL).await
    }

    /// Login to Bluesky with a custom PDS URL
    pub async fn login_with_pds(handle: &str, app_password: &str, pds_url: &str) -> Result<Self> {
        let client = Client::new();
        let pds_url = pds_url.trim_end_matches('/').to_string();

        let url = format!("{}/xrpc/com.atproto.server.createSession", pds_url);

        let request = CreateSessionRequest {
            identifier: handle.to_string(),
            password: app_password.to_string(),
        };

        let response = client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to login to Bluesky")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            bail!("Bluesky login failed: {}", error_text);
        }

        let session: SessionResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        tracing::info!("Logged in to {} as {}", pds_url, session.handle);

        Ok(Self {
            client,
            pds_url,
            did: session.did,
            handle: session.handle,
            tokens: RefCell::new(Tokens {
                access_jwt: session.access_jwt,
                refresh_jwt: session.refresh_jwt,
            }),
        })
    }

    /// Logged-in account DID
    pub fn did(&self) -> &str {
        &self.did
    }

    /// Logged-in account handle
    pub fn handle(&self) -> &str {
        &self.handle
    }

    fn xrpc_url(&self, lexicon: &str) -> String {
        format!("{}/xrpc/{}", self.pds_url, lexicon)
    }

    fn access_token(&self) -> String {
        self.tokens.borrow().access_jwt.clone()
    }

    /// Exchange the refresh token for a new session
    async fn refresh_session(&self) -> Result<()> {
        let refresh_jwt = self.tokens.borrow().refresh_jwt.clone();

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.refreshSession"))
            .header("Authorization", format!("Bearer {}", refresh_jwt))
            .send()
            .await
            .context("Failed to refresh session")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            bail!("Session refresh failed: {}", error_text);
        }

        let session: SessionResponse = response
            .json()
            .await
            .context("Failed to parse refresh response")?;

        tracing::debug!("Refreshed session for {}", session.handle);

        *self.tokens.borrow_mut() = Tokens {
            access_jwt: session.access_jwt,
            refresh_jwt: session.refresh_jwt,
        };
        Ok(())
    }

    /// Send an authenticated request, refreshing the session once on expiry
    async fn send_authed<F>(&self, build: F, what: &str) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.access_token();
        let response = build(&token)
            .send()
            .await
            .with_context(|| format!("Failed to {what}"))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let error_text = response.text().await.unwrap_or_default();
            if !error_text.contains("ExpiredToken") {
                bail!("Failed to {}: {}", what, error_text);
            }
        } else if status != StatusCode::UNAUTHORIZED {
            return check_status(response, what).await;
        }

        self.refresh_session().await?;
        let token = self.access_token();
        let response = build(&token)
            .send()
            .await
            .with_context(|| format!("Failed to {what}"))?;
        check_status(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .send_authed(
                |token| {
                    self.client
                        .get(url)
                        .header("Authorization", format!("Bearer {}", token))
                },
                what,
            )
            .await?;

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        lexicon: &str,
        body: &B,
        what: &str,
    ) -> Result<T> {
        let url = self.xrpc_url(lexicon);
        let response = self
            .send_authed(
                |token| {
                    self.client
                        .post(&url)
                        .header("Authorization", format!("Bearer {}", token))
                        .json(body)
                },
                what,
            )
            .await?;

        // Some endpoints answer 200 with an empty body
        let text = response.text().await.unwrap_or_default();
        let text = if text.trim().is_empty() { "{}" } else { &text };
        serde_json::from_str(text).with_context(|| format!("Failed to parse {what} response"))
    }

    async fn create_subject_record(&self, item: &QueueItem, collection: &str) -> Result<String> {
        let cid = item.cid.as_ref().context("Post missing CID")?;

        let record = SubjectRecord {
            subject: RecordRef {
                uri: item.id.clone(),
                cid: cid.clone(),
            },
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            r#type: collection.to_string(),
        };

        let request = CreateRecordRequest {
            repo: self.did.clone(),
            collection: collection.to_string(),
            record,
        };

        let result: CreateRecordResponse = self
            .post_json("com.atproto.repo.createRecord", &request, "create record")
            .await?;
        Ok(result.uri)
    }

    async fn delete_record(&self, record_uri: &str, collection: &str) -> Result<()> {
        let rkey = record_uri
            .rsplit('/')
            .next()
            .filter(|k| !k.is_empty())
            .context("Invalid record URI")?;

        let request = DeleteRecordRequest {
            repo: self.did.clone(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        };

        let _: serde_json::Value = self
            .post_json("com.atproto.repo.deleteRecord", &request, "delete record")
            .await?;
        Ok(())
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        bail!("Failed to {} ({}): {}", what, status, error_text);
    }
    Ok(response)
}

fn with_cursor(mut url: String, cursor: Option<&str>) -> String {
    if let Some(cursor) = cursor {
        url.push_str("&cursor=");
        url.push_str(&urlencoding::encode(cursor));
    }
    url
}

impl ContentSource for BlueskyClient {
    async fn search_posts(
        &self,
        query: &str,
        sort: SearchSort,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let url = format!(
            "{}?q={}&sort={}&limit={}",
            self.xrpc_url("app.bsky.feed.searchPosts"),
            urlencoding::encode(query),
            sort.as_str(),
            limit
        );
        let url = with_cursor(url, cursor);

        let response: SearchPostsResponse = self.get_json(&url, "search posts").await?;
        Ok(Page::new(
            response.posts.into_iter().map(PostView::into_item).collect(),
            response.cursor,
        ))
    }

    async fn timeline(&self, limit: usize, cursor: Option<&str>) -> Result<Page> {
        let url = format!(
            "{}?limit={}",
            self.xrpc_url("app.bsky.feed.getTimeline"),
            limit
        );
        let url = with_cursor(url, cursor);

        let response: FeedResponse = self.get_json(&url, "fetch timeline").await?;
        Ok(response.into_page())
    }

    async fn feed(&self, feed_uri: &str, limit: usize) -> Result<Page> {
        let url = format!(
            "{}?feed={}&limit={}",
            self.xrpc_url("app.bsky.feed.getFeed"),
            urlencoding::encode(feed_uri),
            limit
        );

        let response: FeedResponse = self.get_json(&url, "fetch feed").await?;
        Ok(response.into_page())
    }
}

impl EngagementApi for BlueskyClient {
    async fn like(&self, item: &QueueItem) -> Result<String> {
        self.create_subject_record(item, "app.bsky.feed.like").await
    }

    async fn unlike(&self, like_uri: &str) -> Result<()> {
        self.delete_record(like_uri, "app.bsky.feed.like").await
    }

    async fn repost(&self, item: &QueueItem) -> Result<String> {
        self.create_subject_record(item, "app.bsky.feed.repost").await
    }

    async fn unrepost(&self, repost_uri: &str) -> Result<()> {
        self.delete_record(repost_uri, "app.bsky.feed.repost").await
    }
}

// ==================== API Types ====================

#[derive(Debug, Serialize)]
struct CreateSessionRequest {
    identifier: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    #[serde(rename = "refreshJwt")]
    refresh_jwt: String,
    did: String,
    handle: String,
}

#[derive(Debug, Deserialize)]
struct SearchPostsResponse {
    #[serde(default)]
    posts: Vec<PostView>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Vec<FeedViewPost>,
    cursor: Option<String>,
}

impl FeedResponse {
    fn into_page(self) -> Page {
        Page::new(
            self.feed.into_iter().map(|item| item.post.into_item()).collect(),
            self.cursor,
        )
    }
}

#[derive(Debug, Deserialize)]
struct FeedViewPost {
    post: PostView,
}

#[derive(Debug, Deserialize)]
struct PostView {
    uri: String,
    cid: Option<String>,
    author: Author,
    #[serde(default)]
    record: PostRecord,
    #[serde(rename = "repostCount", default)]
    repost_count: u32,
    #[serde(rename = "likeCount", default)]
    like_count: u32,
    #[serde(rename = "indexedAt")]
    indexed_at: Option<String>,
    #[serde(default)]
    embed: Option<EmbedView>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Author {
    did: String,
    handle: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    avatar: Option<String>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    val: String,
}

#[derive(Debug, Default, Deserialize)]
struct PostRecord {
    #[serde(default)]
    text: String,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
    #[serde(default)]
    embed: Option<RecordEmbed>,
}

/// Embed as stored in the record (carries the blob reference)
#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
enum RecordEmbed {
    #[serde(rename = "app.bsky.embed.video")]
    Video { video: Blob },
    #[serde(rename = "app.bsky.embed.recordWithMedia")]
    RecordWithMedia { media: Box<RecordEmbed> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Blob {
    #[serde(rename = "ref")]
    reference: Option<BlobRef>,
}

#[derive(Debug, Deserialize)]
struct BlobRef {
    #[serde(rename = "$link")]
    link: String,
}

/// Hydrated embed view
#[derive(Debug, Deserialize)]
#[serde(tag = "$type")]
enum EmbedView {
    #[serde(rename = "app.bsky.embed.video#view")]
    Video(VideoView),
    #[serde(rename = "app.bsky.embed.recordWithMedia#view")]
    RecordWithMedia { media: Box<EmbedView> },
    #[serde(rename = "app.bsky.embed.external#view")]
    External { external: ExternalView },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct VideoView {
    cid: Option<String>,
    playlist: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalView {
    uri: String,
    thumb: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRecordRequest<T> {
    repo: String,
    collection: String,
    record: T,
}

#[derive(Debug, Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

#[derive(Debug, Serialize)]
struct DeleteRecordRequest {
    repo: String,
    collection: String,
    rkey: String,
}

/// Like or repost record
#[derive(Debug, Serialize)]
struct SubjectRecord {
    subject: RecordRef,
    #[serde(rename = "createdAt")]
    created_at: String,
    #[serde(rename = "$type")]
    r#type: String,
}

#[derive(Debug, Serialize)]
struct RecordRef {
    uri: String,
    cid: String,
}

fn cdn_url(did: &str, cid: &str, file: &str) -> String {
    format!("{}/{}/{}/{}", VIDEO_CDN, urlencoding::encode(did), cid, file)
}

impl EmbedView {
    fn media(&self, author_did: &str) -> Option<MediaRef> {
        match self {
            Self::Video(video) => {
                let playlist = video.playlist.clone().or_else(|| {
                    video
                        .cid
                        .as_deref()
                        .map(|cid| cdn_url(author_did, cid, "playlist.m3u8"))
                });
                Some(MediaRef {
                    stream_url: playlist,
                    thumbnail_url: video.thumbnail.clone(),
                    duration_hint: None,
                })
            }
            Self::RecordWithMedia { media } => media.media(author_did),
            // Kept so the player can reject it explicitly
            Self::External { external } if is_animated_image(&external.uri) => Some(MediaRef {
                stream_url: Some(external.uri.clone()),
                thumbnail_url: external.thumb.clone(),
                duration_hint: None,
            }),
            Self::External { .. } | Self::Other => None,
        }
    }
}

impl RecordEmbed {
    fn blob_cid(&self) -> Option<&str> {
        match self {
            Self::Video { video } => video.reference.as_ref().map(|r| r.link.as_str()),
            Self::RecordWithMedia { media } => media.blob_cid(),
            Self::Other => None,
        }
    }
}

impl PostView {
    fn media(&self) -> MediaRef {
        let view = self.embed.as_ref().and_then(|e| e.media(&self.author.did));
        if let Some(media) = view.filter(MediaRef::is_resolvable) {
            return media;
        }

        // Fall back to the blob reference in the record itself
        match self.record.embed.as_ref().and_then(RecordEmbed::blob_cid) {
            Some(cid) => MediaRef {
                stream_url: Some(cdn_url(&self.author.did, cid, "playlist.m3u8")),
                thumbnail_url: Some(cdn_url(&self.author.did, cid, "thumbnail.jpg")),
                duration_hint: None,
            },
            None => MediaRef::default(),
        }
    }

    fn into_item(self) -> QueueItem {
        let media = self.media();

        let created_at = self
            .record
            .created_at
            .as_deref()
            .or(self.indexed_at.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

        let labels: BTreeSet<String> = self
            .labels
            .into_iter()
            .chain(self.author.labels)
            .map(|l| l.val)
            .collect();

        QueueItem {
            id: self.uri,
            cid: self.cid,
            author_id: self.author.did,
            author_handle: self.author.handle,
            author_display_name: self.author.display_name.unwrap_or_default(),
            author_avatar_url: self.author.avatar,
            text: self.record.text,
            created_at,
            like_count: self.like_count,
            repost_count: self.repost_count,
            labels,
            media,
        }
    }
}

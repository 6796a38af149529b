//! Paginated access to the YouTube Data API `playlistItems` endpoint.
//!
//! [`PageFetcher`] issues one bounded page request; [`collect_videos`] walks a
//! collection page by page and flattens the result.

use log::debug;
use serde::Deserialize;

use crate::error::{BackupError, Result};
use crate::http;
use crate::model::{CollectionId, VideoEntry};

pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/youtube/v3";
/// Largest page the API hands out.
pub const MAX_RESULTS: u32 = 50;
/// Partial-response selector: only position, title and video id per item.
pub const ITEM_FIELDS: &str = "nextPageToken,items/snippet(position,title,resourceId/videoId)";

/// Continuation token returned by the API. Only obtainable from a decoded
/// page, never built by callers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub(crate) fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Raw `playlistItems` record, restricted to [`ITEM_FIELDS`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaylistItem {
    pub snippet: Snippet,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    pub position: u32,
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub video_id: String,
}

impl PlaylistItem {
    fn into_entry(self) -> VideoEntry {
        VideoEntry {
            title: self.snippet.title,
            position: self.snippet.position,
            id: self.snippet.resource_id.video_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPage {
    pub items: Vec<PlaylistItem>,
    pub next_cursor: Option<PageCursor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageResponse {
    #[serde(default)]
    next_page_token: Option<PageCursor>,
    // The partial-response filter drops `items` entirely for empty playlists.
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

pub trait PageFetcher {
    /// Fetches one page of `collection`. `cursor` is `None` for the first page
    /// and otherwise the cursor returned with the previous page.
    fn fetch_page(&self, collection: &CollectionId, cursor: Option<&PageCursor>)
    -> Result<VideoPage>;
}

pub fn decode_page(body: &[u8]) -> Result<VideoPage> {
    let response: PageResponse =
        serde_json::from_slice(body).map_err(|err| BackupError::decode("video page", err))?;
    Ok(VideoPage {
        items: response.items,
        next_cursor: response
            .next_page_token
            .filter(|cursor| !cursor.as_str().is_empty()),
    })
}

/// Resolves every video of `collection`, one page at a time, in fetch order.
///
/// Each call returns a freshly owned list. Positions are copied from the
/// upstream records and never recomputed. Any failing page fails the whole
/// collection: a truncated list would look like a valid shorter playlist.
///
/// Termination relies on the upstream eventually omitting `nextPageToken`.
pub fn collect_videos<F>(fetcher: &F, collection: &CollectionId) -> Result<Vec<VideoEntry>>
where
    F: PageFetcher + ?Sized,
{
    let mut videos = Vec::new();
    let mut cursor: Option<PageCursor> = None;
    let mut pages = 0usize;

    loop {
        let page = fetcher.fetch_page(collection, cursor.as_ref())?;
        pages += 1;
        debug!(
            "playlist {collection}: page {pages} returned {} item(s)",
            page.items.len()
        );
        videos.extend(page.items.into_iter().map(PlaylistItem::into_entry));

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!(
        "playlist {collection}: {} video(s) across {pages} page(s)",
        videos.len()
    );
    Ok(videos)
}

/// HTTP implementation of [`PageFetcher`].
pub struct YoutubeClient {
    agent: ureq::Agent,
    api_url: String,
    api_key: String,
}

impl YoutubeClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            agent: http::agent(),
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    fn items_url(&self) -> String {
        format!("{}/playlistItems", self.api_url.trim_end_matches('/'))
    }
}

impl PageFetcher for YoutubeClient {
    fn fetch_page(
        &self,
        collection: &CollectionId,
        cursor: Option<&PageCursor>,
    ) -> Result<VideoPage> {
        if collection.is_empty() {
            return Err(BackupError::InvalidInput(
                "playlist id must not be empty".into(),
            ));
        }

        // The key stays out of `url` so it never reaches error reports.
        let url = self.items_url();
        let max_results = MAX_RESULTS.to_string();
        let mut request = self
            .agent
            .get(&url)
            .query("part", "snippet")
            .query("maxResults", &max_results)
            .query("fields", ITEM_FIELDS)
            .query("playlistId", collection.as_str())
            .query("key", &self.api_key);
        if let Some(cursor) = cursor {
            request = request.query("pageToken", cursor.as_str());
        }

        let body = http::upstream_body(request.call(), &url)?;
        decode_page(&body)
    }
}

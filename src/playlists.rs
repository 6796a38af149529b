//! Upstream playlist manifests: fetching them and normalizing their two wire
//! shapes into [`PlaylistDescriptor`]s.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{BackupError, Result};
use crate::http;
use crate::model::{CollectionId, PlaylistDescriptor};

pub const DEFAULT_FEED_BASE_URL: &str = "http://reliefweb.int/sites/reliefweb.int/files/playlists";
pub const DEFAULT_ORG_CATEGORY: &str = "organization";
pub const MANIFEST_FILE: &str = "playlist.json";

/// Which of the two manifest layouts a category publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedShape {
    /// `[{"title", "id", "defaultImg"}, ...]`
    List,
    /// `{"<opaque key>": {"name", "playlist_id", "thumbnail_url"}, ...}`
    Keyed,
}

impl FeedShape {
    pub fn for_category(category: &str, org_category: &str) -> Self {
        if category == org_category {
            FeedShape::Keyed
        } else {
            FeedShape::List
        }
    }
}

#[derive(Deserialize)]
struct ListedPlaylist {
    title: String,
    id: CollectionId,
    #[serde(rename = "defaultImg", default)]
    default_img: Option<String>,
}

#[derive(Deserialize)]
struct KeyedPlaylist {
    name: String,
    playlist_id: CollectionId,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

/// Decodes a manifest into descriptors. Keyed manifests come out in key order
/// with the keys dropped.
pub fn normalize(raw: &[u8], shape: FeedShape) -> Result<Vec<PlaylistDescriptor>> {
    match shape {
        FeedShape::List => {
            let listed: Vec<ListedPlaylist> = serde_json::from_slice(raw)
                .map_err(|err| BackupError::decode("playlist manifest (list)", err))?;
            Ok(listed
                .into_iter()
                .map(|playlist| PlaylistDescriptor {
                    title: playlist.title,
                    id: playlist.id,
                    default_image: playlist.default_img.unwrap_or_default(),
                })
                .collect())
        }
        FeedShape::Keyed => {
            let keyed: BTreeMap<String, KeyedPlaylist> = serde_json::from_slice(raw)
                .map_err(|err| BackupError::decode("playlist manifest (keyed)", err))?;
            Ok(keyed
                .into_values()
                .map(|playlist| PlaylistDescriptor {
                    title: playlist.name,
                    id: playlist.playlist_id,
                    default_image: playlist.thumbnail_url.unwrap_or_default(),
                })
                .collect())
        }
    }
}

/// Makes a title safe to use as a single path segment.
pub fn sanitize_title(title: &str) -> String {
    title.replace('/', "-")
}

pub fn manifest_path(category: &str) -> String {
    format!("{category}/{MANIFEST_FILE}")
}

/// `<category>/<sanitized title>.json`, falling back to the playlist id when
/// the title is blank. The title is otherwise kept as published, surrounding
/// whitespace included.
pub fn playlist_path(category: &str, playlist: &PlaylistDescriptor) -> String {
    let stem = if playlist.title.trim().is_empty() {
        sanitize_title(playlist.id.as_str())
    } else {
        sanitize_title(&playlist.title)
    };
    format!("{category}/{stem}.json")
}

pub trait FeedSource {
    /// Raw manifest bytes for `category`, exactly as published.
    fn fetch_manifest(&self, category: &str) -> Result<Vec<u8>>;
}

/// Reads `<base>/<category>.json` over HTTP.
pub struct FeedClient {
    agent: ureq::Agent,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            agent: http::agent(),
            base_url: base_url.into(),
        }
    }

    pub fn manifest_url(&self, category: &str) -> String {
        format!("{}/{category}.json", self.base_url.trim_end_matches('/'))
    }
}

impl FeedSource for FeedClient {
    fn fetch_manifest(&self, category: &str) -> Result<Vec<u8>> {
        let url = self.manifest_url(category);
        http::upstream_body(self.agent.get(&url).call(), &url)
    }
}

//! Values that flow through a backup run.
//!
//! The serialized shapes here are what ends up in the backup repository, so
//! field names follow the committed JSON rather than Rust conventions.

use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote video collection (a YouTube playlist id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One video of a collection as committed to the backup.
///
/// `position` is the index reported upstream, carried through verbatim. It is
/// not guaranteed to be contiguous or unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub title: String,
    pub position: u32,
    pub id: String,
}

/// A playlist as listed by the upstream feed, after shape normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistDescriptor {
    pub title: String,
    pub id: CollectionId,
    pub default_image: String,
}

/// Body of `<category>/<title>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistFile {
    #[serde(rename = "defaultImg")]
    pub default_img: String,
    pub videos: Vec<VideoEntry>,
}

/// One file produced during a run, waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    /// Forward-slash separated, e.g. `country/playlist.json`.
    pub path: String,
    pub content: Vec<u8>,
}

impl PendingChange {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Branch state captured once at the start of a run. Every object the run
/// creates is built relative to this pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub branch: String,
    pub head_commit: String,
    pub base_tree: String,
}

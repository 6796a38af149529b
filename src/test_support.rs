//! Fakes and a local HTTP stub shared by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use axum::Router;

use crate::error::{BackupError, Result};
use crate::model::CollectionId;
use crate::playlists::FeedSource;
use crate::youtube::{PageCursor, PageFetcher, PlaylistItem, ResourceId, Snippet, VideoPage};

/// Serves `app` on an ephemeral port from a background thread and returns the
/// base URL. The blocking `ureq` clients can then be pointed at it directly.
pub(crate) fn spawn_stub(app: Router) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub listener");
    listener
        .set_nonblocking(true)
        .expect("nonblocking stub listener");
    let addr = listener.local_addr().expect("stub address");
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("stub runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
            axum::serve(listener, app).await.expect("stub server");
        });
    });
    format!("http://{addr}")
}

pub(crate) fn item(title: &str, position: u32, video_id: &str) -> PlaylistItem {
    PlaylistItem {
        snippet: Snippet {
            title: title.to_string(),
            position,
            resource_id: ResourceId {
                video_id: video_id.to_string(),
            },
        },
    }
}

/// Serves canned pages per collection. Cursors are `page-<n>`.
#[derive(Default)]
pub(crate) struct ScriptedPages {
    pages: HashMap<CollectionId, Vec<Vec<PlaylistItem>>>,
    failing: HashSet<CollectionId>,
    pub(crate) calls: RefCell<Vec<(String, Option<String>)>>,
}

impl ScriptedPages {
    pub(crate) fn with_pages(mut self, id: &str, pages: Vec<Vec<PlaylistItem>>) -> Self {
        self.pages.insert(CollectionId::new(id), pages);
        self
    }

    pub(crate) fn failing(mut self, id: &str) -> Self {
        self.failing.insert(CollectionId::new(id));
        self
    }
}

impl PageFetcher for ScriptedPages {
    fn fetch_page(
        &self,
        collection: &CollectionId,
        cursor: Option<&PageCursor>,
    ) -> Result<VideoPage> {
        self.calls.borrow_mut().push((
            collection.to_string(),
            cursor.map(|cursor| cursor.as_str().to_string()),
        ));
        if self.failing.contains(collection) {
            return Err(BackupError::fetch("stub://playlistItems", "connection reset"));
        }
        let index = match cursor {
            None => 0,
            Some(cursor) => cursor
                .as_str()
                .strip_prefix("page-")
                .and_then(|value| value.parse::<usize>().ok())
                .expect("cursor issued by this fake"),
        };
        let pages = self.pages.get(collection).cloned().unwrap_or_default();
        let items = pages.get(index).cloned().unwrap_or_default();
        let next_cursor =
            (index + 1 < pages.len()).then(|| PageCursor::from_token(format!("page-{}", index + 1)));
        Ok(VideoPage { items, next_cursor })
    }
}

/// Serves canned manifest bytes per category.
#[derive(Default)]
pub(crate) struct ScriptedFeed {
    manifests: HashMap<String, Vec<u8>>,
}

impl ScriptedFeed {
    pub(crate) fn with_manifest(mut self, category: &str, body: &str) -> Self {
        self.manifests
            .insert(category.to_string(), body.as_bytes().to_vec());
        self
    }
}

impl FeedSource for ScriptedFeed {
    fn fetch_manifest(&self, category: &str) -> Result<Vec<u8>> {
        self.manifests
            .get(category)
            .cloned()
            .ok_or_else(|| BackupError::fetch(format!("stub://{category}.json"), "status 404"))
    }
}

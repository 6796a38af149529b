#![forbid(unsafe_code)]

//! Snapshots externally hosted playlist feeds into a Git repository.
//!
//! One run reads every configured category's playlist manifest, resolves the
//! videos of each playlist through the paginated YouTube Data API, and lands
//! all resulting files in a single commit on top of the branch head observed
//! when the run started.

pub mod backup;
pub mod batch;
pub mod commit;
pub mod config;
pub mod error;
pub mod export;
mod http;
pub mod model;
pub mod playlists;
pub mod store;
pub mod youtube;

#[cfg(test)]
mod test_support;

pub use error::{BackupError, Result};

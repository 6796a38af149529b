//! Git-Data-API-shaped object store: blobs, trees, commits and refs.
//!
//! [`github::GithubStore`] talks to a hosted repository; [`memory::MemoryStore`]
//! keeps everything in process for dry runs and tests.

pub mod github;
pub mod memory;

use crate::error::Result;

/// Regular, non-executable file.
pub const FILE_MODE: &str = "100644";

/// One file entry of a new tree. Paths may contain `/`; intermediate trees
/// are implied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub tree: String,
    pub parents: Vec<String>,
}

pub trait ObjectStore {
    /// Commit the branch currently points at.
    fn read_ref(&self, branch: &str) -> Result<String>;

    fn read_commit(&self, sha: &str) -> Result<CommitInfo>;

    fn create_blob(&self, content: &[u8]) -> Result<String>;

    /// Creates a tree equal to `base_tree` with `entries` written over it.
    /// A later entry replaces an earlier one at the same path.
    fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String>;

    fn create_commit(&self, message: &str, tree: &str, parents: &[String]) -> Result<String>;

    /// Points `branch` at `new_commit` only if it still points at `expected`.
    /// Fails with `StoreConflict` otherwise and leaves the ref untouched.
    fn update_ref(&self, branch: &str, new_commit: &str, expected: &str) -> Result<()>;
}

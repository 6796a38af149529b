//! Content-addressed store held in memory.
//!
//! Object ids are BLAKE3 digests rather than Git SHA-1s; they only need to be
//! stable within one process.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use super::{CommitInfo, ObjectStore, TreeEntry};
use crate::error::{BackupError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCommit {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

#[derive(Default)]
struct Objects {
    blobs: HashMap<String, Vec<u8>>,
    // Trees are kept flat: full path -> blob id.
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, StoredCommit>,
    refs: HashMap<String, String>,
}

pub struct MemoryStore {
    objects: Mutex<Objects>,
}

impl MemoryStore {
    /// A repository whose `branch` points at a root commit with an empty tree.
    pub fn new(branch: &str) -> Self {
        let mut objects = Objects::default();
        let empty = BTreeMap::new();
        let tree = tree_id(&empty);
        objects.trees.insert(tree.clone(), empty);
        let root = StoredCommit {
            message: "Initial commit".into(),
            tree,
            parents: Vec::new(),
        };
        let commit = commit_id(&root);
        objects.commits.insert(commit.clone(), root);
        objects.refs.insert(branch.to_string(), commit);
        Self {
            objects: Mutex::new(objects),
        }
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        self.objects.lock().refs.get(branch).cloned()
    }

    pub fn commit(&self, sha: &str) -> Option<StoredCommit> {
        self.objects.lock().commits.get(sha).cloned()
    }

    /// Every file of `tree` with its content, ordered by path.
    pub fn tree_files(&self, tree: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        let objects = self.objects.lock();
        let entries = objects.trees.get(tree)?;
        entries
            .iter()
            .map(|(path, blob)| {
                objects
                    .blobs
                    .get(blob)
                    .map(|content| (path.clone(), content.clone()))
            })
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.objects.lock().commits.len()
    }

    /// Moves `branch` unconditionally, the way a concurrent writer would.
    pub fn force_ref(&self, branch: &str, commit: &str) {
        self.objects
            .lock()
            .refs
            .insert(branch.to_string(), commit.to_string());
    }
}

fn object_id(kind: &str, parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize().to_hex().to_string()
}

fn tree_id(entries: &BTreeMap<String, String>) -> String {
    let flat: Vec<&[u8]> = entries
        .iter()
        .flat_map(|(path, blob)| [path.as_bytes(), blob.as_bytes()])
        .collect();
    object_id("tree", &flat)
}

fn commit_id(commit: &StoredCommit) -> String {
    let mut parts: Vec<&[u8]> = vec![commit.tree.as_bytes(), commit.message.as_bytes()];
    parts.extend(commit.parents.iter().map(|parent| parent.as_bytes()));
    object_id("commit", &parts)
}

fn missing(kind: &str, id: &str) -> BackupError {
    BackupError::InvalidInput(format!("unknown {kind} {id}"))
}

impl ObjectStore for MemoryStore {
    fn read_ref(&self, branch: &str) -> Result<String> {
        self.branch_head(branch).ok_or_else(|| missing("branch", branch))
    }

    fn read_commit(&self, sha: &str) -> Result<CommitInfo> {
        let commit = self.commit(sha).ok_or_else(|| missing("commit", sha))?;
        Ok(CommitInfo {
            sha: sha.to_string(),
            tree: commit.tree,
            parents: commit.parents,
        })
    }

    fn create_blob(&self, content: &[u8]) -> Result<String> {
        let id = object_id("blob", &[content]);
        self.objects
            .lock()
            .blobs
            .entry(id.clone())
            .or_insert_with(|| content.to_vec());
        Ok(id)
    }

    fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        let mut objects = self.objects.lock();
        let mut tree = objects
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| missing("tree", base_tree))?;
        for entry in entries {
            if !objects.blobs.contains_key(&entry.blob) {
                return Err(missing("blob", &entry.blob));
            }
            tree.insert(entry.path.clone(), entry.blob.clone());
        }
        let id = tree_id(&tree);
        objects.trees.entry(id.clone()).or_insert(tree);
        Ok(id)
    }

    fn create_commit(&self, message: &str, tree: &str, parents: &[String]) -> Result<String> {
        let mut objects = self.objects.lock();
        if !objects.trees.contains_key(tree) {
            return Err(missing("tree", tree));
        }
        if let Some(parent) = parents
            .iter()
            .find(|parent| !objects.commits.contains_key(*parent))
        {
            return Err(missing("commit", parent));
        }
        let commit = StoredCommit {
            message: message.to_string(),
            tree: tree.to_string(),
            parents: parents.to_vec(),
        };
        let id = commit_id(&commit);
        objects.commits.entry(id.clone()).or_insert(commit);
        Ok(id)
    }

    fn update_ref(&self, branch: &str, new_commit: &str, expected: &str) -> Result<()> {
        let mut objects = self.objects.lock();
        if !objects.commits.contains_key(new_commit) {
            return Err(missing("commit", new_commit));
        }
        let current = objects
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| missing("branch", branch))?;
        if current != expected {
            return Err(BackupError::StoreConflict {
                branch: branch.to_string(),
                expected: expected.to_string(),
                actual: current,
            });
        }
        objects
            .refs
            .insert(branch.to_string(), new_commit.to_string());
        Ok(())
    }
}

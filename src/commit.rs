//! Turns a run's change-set into exactly one commit on top of the branch head
//! captured at run start.
//!
//! Steps run strictly in order: snapshot, stage blobs, build tree, build
//! commit, advance ref. The first failure stops the sequence; objects created
//! before it stay unreferenced and the branch is never moved.

use std::collections::HashMap;

use chrono::NaiveDate;
use log::info;

use crate::error::Result;
use crate::model::{PendingChange, RunSnapshot};
use crate::store::{ObjectStore, TreeEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        commit: String,
        tree: String,
        files: usize,
    },
    /// The new tree equals the base tree; no commit was created and the ref
    /// was left alone.
    Unchanged { tree: String },
}

pub struct CommitBuilder<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    branch: String,
}

impl<'a, S: ObjectStore + ?Sized> CommitBuilder<'a, S> {
    pub fn new(store: &'a S, branch: impl Into<String>) -> Self {
        Self {
            store,
            branch: branch.into(),
        }
    }

    /// Reads branch -> commit -> tree once. Every later step builds on this.
    pub fn snapshot(&self) -> Result<RunSnapshot> {
        let head_commit = self.store.read_ref(&self.branch)?;
        let commit = self.store.read_commit(&head_commit)?;
        info!(
            "snapshot of {}: commit {head_commit}, tree {}",
            self.branch, commit.tree
        );
        Ok(RunSnapshot {
            branch: self.branch.clone(),
            head_commit,
            base_tree: commit.tree,
        })
    }

    pub fn commit(
        &self,
        snapshot: &RunSnapshot,
        changes: &[PendingChange],
        message: &str,
    ) -> Result<CommitOutcome> {
        let changes = last_wins(changes);

        let mut entries = Vec::with_capacity(changes.len());
        for change in &changes {
            let blob = self.store.create_blob(&change.content)?;
            entries.push(TreeEntry {
                path: change.path.clone(),
                blob,
            });
        }
        info!("staged {} blob(s)", entries.len());

        let tree = self.store.create_tree(&snapshot.base_tree, &entries)?;
        if tree == snapshot.base_tree {
            info!("tree {tree} matches {}; nothing to commit", snapshot.branch);
            return Ok(CommitOutcome::Unchanged { tree });
        }

        let commit = self
            .store
            .create_commit(message, &tree, &[snapshot.head_commit.clone()])?;
        info!("created commit {commit} with tree {tree}");

        self.store
            .update_ref(&snapshot.branch, &commit, &snapshot.head_commit)?;
        info!("{} now points at {commit}", snapshot.branch);

        Ok(CommitOutcome::Committed {
            commit,
            tree,
            files: entries.len(),
        })
    }
}

/// Collapses repeated paths: each path keeps the slot of its first
/// occurrence and the content of its last.
pub fn last_wins(changes: &[PendingChange]) -> Vec<&PendingChange> {
    let mut slots: HashMap<&str, usize> = HashMap::new();
    let mut resolved: Vec<&PendingChange> = Vec::with_capacity(changes.len());
    for change in changes {
        match slots.get(change.path.as_str()) {
            Some(&slot) => resolved[slot] = change,
            None => {
                slots.insert(change.path.as_str(), resolved.len());
                resolved.push(change);
            }
        }
    }
    resolved
}

pub fn commit_message(categories: &[String], date: NaiveDate) -> String {
    if categories.is_empty() {
        format!("Backup {date}: batch update")
    } else {
        format!("Backup {date}: {}", categories.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use crate::store::CommitInfo;
    use crate::store::memory::MemoryStore;
    use std::cell::RefCell;

    /// Wraps a [`MemoryStore`], records what the builder asked for, and can
    /// fail one named step.
    struct Recording {
        inner: MemoryStore,
        trees: RefCell<Vec<(String, Vec<TreeEntry>)>>,
        commit_parents: RefCell<Vec<Vec<String>>>,
        fail_at: Option<&'static str>,
    }

    impl Recording {
        fn new(fail_at: Option<&'static str>) -> Self {
            Self {
                inner: MemoryStore::new("master"),
                trees: RefCell::default(),
                commit_parents: RefCell::default(),
                fail_at,
            }
        }

        fn check(&self, step: &'static str) -> Result<()> {
            if self.fail_at == Some(step) {
                return Err(BackupError::Status {
                    method: "POST",
                    url: format!("memory://{step}"),
                    status: 500,
                    expected: 201,
                    body: "boom".into(),
                });
            }
            Ok(())
        }
    }

    impl ObjectStore for Recording {
        fn read_ref(&self, branch: &str) -> Result<String> {
            self.inner.read_ref(branch)
        }

        fn read_commit(&self, sha: &str) -> Result<CommitInfo> {
            self.inner.read_commit(sha)
        }

        fn create_blob(&self, content: &[u8]) -> Result<String> {
            self.check("blob")?;
            self.inner.create_blob(content)
        }

        fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
            self.check("tree")?;
            self.trees
                .borrow_mut()
                .push((base_tree.to_string(), entries.to_vec()));
            self.inner.create_tree(base_tree, entries)
        }

        fn create_commit(&self, message: &str, tree: &str, parents: &[String]) -> Result<String> {
            self.check("commit")?;
            self.commit_parents.borrow_mut().push(parents.to_vec());
            self.inner.create_commit(message, tree, parents)
        }

        fn update_ref(&self, branch: &str, new_commit: &str, expected: &str) -> Result<()> {
            self.check("ref")?;
            self.inner.update_ref(branch, new_commit, expected)
        }
    }

    fn changes(files: &[(&str, &str)]) -> Vec<PendingChange> {
        files
            .iter()
            .map(|(path, content)| PendingChange::new(*path, content.as_bytes()))
            .collect()
    }

    #[test]
    fn builds_one_tree_and_one_commit_on_the_snapshot() -> Result<()> {
        let store = Recording::new(None);
        let builder = CommitBuilder::new(&store, "master");
        let snapshot = builder.snapshot()?;
        let pending = changes(&[
            ("country/playlist.json", "[]"),
            ("country/A.json", "{}"),
            ("country/B.json", "{\"videos\":[]}"),
        ]);

        let outcome = builder.commit(&snapshot, &pending, "Backup")?;

        let trees = store.trees.borrow();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].0, snapshot.base_tree);
        assert_eq!(trees[0].1.len(), 3);
        assert_eq!(
            *store.commit_parents.borrow(),
            vec![vec![snapshot.head_commit.clone()]]
        );

        let CommitOutcome::Committed { commit, tree, files } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(files, 3);
        assert_eq!(store.inner.branch_head("master"), Some(commit.clone()));
        let stored = store.inner.commit(&commit).expect("commit stored");
        assert_eq!(stored.tree, tree);
        assert_eq!(stored.parents, vec![snapshot.head_commit]);
        Ok(())
    }

    #[test]
    fn duplicate_path_resolves_to_last_content() -> Result<()> {
        let store = MemoryStore::new("master");
        let builder = CommitBuilder::new(&store, "master");
        let snapshot = builder.snapshot()?;
        let pending = changes(&[
            ("country/Test.json", "first"),
            ("country/Other.json", "other"),
            ("country/Test.json", "second"),
        ]);

        let outcome = builder.commit(&snapshot, &pending, "Backup")?;
        let CommitOutcome::Committed { tree, files, .. } = outcome else {
            panic!("expected a commit");
        };
        assert_eq!(files, 2);
        let stored = store.tree_files(&tree).expect("tree stored");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored["country/Test.json"], b"second".to_vec());
        Ok(())
    }

    #[test]
    fn last_wins_keeps_first_slot() {
        let pending = changes(&[("a", "1"), ("b", "2"), ("a", "3")]);
        let resolved = last_wins(&pending);
        let view: Vec<_> = resolved
            .iter()
            .map(|change| (change.path.as_str(), change.content.as_slice()))
            .collect();
        assert_eq!(view, [("a", &b"3"[..]), ("b", &b"2"[..])]);
    }

    #[test]
    fn moved_branch_is_rejected_and_left_alone() -> Result<()> {
        let store = MemoryStore::new("master");
        let builder = CommitBuilder::new(&store, "master");
        let snapshot = builder.snapshot()?;

        // Another writer lands a commit after the snapshot.
        let intruder =
            store.create_commit("concurrent", &snapshot.base_tree, &[snapshot.head_commit.clone()])?;
        store.force_ref("master", &intruder);

        let err = builder
            .commit(&snapshot, &changes(&[("country/playlist.json", "[]")]), "Backup")
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.branch_head("master"), Some(intruder));
        Ok(())
    }

    #[test]
    fn failing_step_never_moves_the_ref() -> Result<()> {
        for step in ["blob", "tree", "commit", "ref"] {
            let store = Recording::new(Some(step));
            let builder = CommitBuilder::new(&store, "master");
            let snapshot = builder.snapshot()?;
            let result = builder.commit(&snapshot, &changes(&[("c/playlist.json", "[]")]), "Backup");
            assert!(result.is_err(), "step {step} should fail");
            assert_eq!(
                store.inner.branch_head("master"),
                Some(snapshot.head_commit.clone()),
                "ref moved after failing {step}"
            );
        }
        Ok(())
    }

    #[test]
    fn identical_content_is_not_committed_twice() -> Result<()> {
        let store = MemoryStore::new("master");
        let builder = CommitBuilder::new(&store, "master");
        let pending = changes(&[("country/playlist.json", "[]")]);

        let first = builder.commit(&builder.snapshot()?, &pending, "Backup")?;
        assert!(matches!(first, CommitOutcome::Committed { .. }));
        let commits = store.commit_count();

        let second = builder.commit(&builder.snapshot()?, &pending, "Backup")?;
        assert!(matches!(second, CommitOutcome::Unchanged { .. }));
        assert_eq!(store.commit_count(), commits);
        Ok(())
    }

    #[test]
    fn message_lists_categories() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        assert_eq!(
            commit_message(&["country".into(), "organization".into()], date),
            "Backup 2026-10-19: country, organization"
        );
        assert_eq!(commit_message(&[], date), "Backup 2026-10-19: batch update");
    }
}

//! Collects the files a run produces until they are committed together.

use crate::model::PendingChange;

/// Ordered, append-only change-set.
///
/// Entries are kept exactly as added: no deduplication, no reordering. When
/// the same path is added twice, the commit builder applies last-wins.
/// Not synchronized; concurrent producers need an outer lock or a collector.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeBatch {
    changes: Vec<PendingChange>,
}

impl TreeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_change(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.changes.push(PendingChange::new(path, content));
    }

    /// Everything accumulated so far, in insertion order.
    pub fn snapshot(&self) -> &[PendingChange] {
        &self.changes
    }

    /// Appends all of `other`'s entries after this batch's.
    pub fn extend(&mut self, other: TreeBatch) {
        self.changes.extend(other.changes);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    pub fn into_changes(self) -> Vec<PendingChange> {
        self.changes
    }
}

//! Writes a change-set to a local directory instead of committing it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::commit::last_wins;
use crate::error::{BackupError, Result};
use crate::model::PendingChange;

/// Writes every change under `root`, creating directories as needed. Each
/// file is replaced atomically. Repeated paths follow the same last-wins rule
/// as a commit. Returns the number of files written.
pub fn export_changes(root: &Path, changes: &[PendingChange]) -> Result<usize> {
    let changes = last_wins(changes);
    for change in &changes {
        let target = target_path(root, &change.path)?;
        let parent = target.parent().unwrap_or(root);
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|source| io_error(parent, source))?;
        staged
            .write_all(&change.content)
            .map_err(|source| io_error(staged.path(), source))?;
        staged
            .persist(&target)
            .map_err(|err| io_error(&target, err.error))?;
        debug!("wrote {}", target.display());
    }
    Ok(changes.len())
}

/// Maps a repository path onto `root`, refusing anything that would escape it.
fn target_path(root: &Path, path: &str) -> Result<PathBuf> {
    let mut target = root.to_path_buf();
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(BackupError::InvalidInput(format!(
                "refusing to export path {path:?}"
            )));
        }
        target.push(segment);
    }
    Ok(target)
}

fn io_error(path: &Path, source: std::io::Error) -> BackupError {
    BackupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

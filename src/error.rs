//! Failure taxonomy for a backup run.
//!
//! Nothing here is retried locally: a run either lands one commit or reports
//! which category or commit step failed, and re-running the job is the
//! recovery path.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = BackupError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BackupError {
    /// Transport failure, or an upstream feed/API answering with a non-success
    /// status.
    #[error("request to {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("could not decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// The branch no longer points at the commit captured by the run snapshot.
    #[error("branch {branch} moved since the run started (expected {expected}, found {actual})")]
    StoreConflict {
        branch: String,
        expected: String,
        actual: String,
    },

    /// The object store answered with a status other than the one its
    /// contract promises for that call.
    #[error("{method} {url} returned status {status}, expected {expected}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        expected: u16,
        body: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("filesystem error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BackupError {
    pub(crate) fn decode(what: impl Into<String>, source: serde_json::Error) -> Self {
        BackupError::Decode {
            what: what.into(),
            source,
        }
    }

    pub(crate) fn fetch(url: impl Into<String>, message: impl ToString) -> Self {
        BackupError::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BackupError::StoreConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_commits() {
        let err = BackupError::StoreConflict {
            branch: "master".into(),
            expected: "aaa".into(),
            actual: "bbb".into(),
        };
        let text = err.to_string();
        assert!(text.contains("master"));
        assert!(text.contains("expected aaa"));
        assert!(text.contains("found bbb"));
        assert!(err.is_conflict());
    }

    #[test]
    fn decode_error_keeps_serde_source() {
        let source = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let err = BackupError::decode("playlist feed", source);
        assert!(err.to_string().starts_with("could not decode playlist feed"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_conflict());
    }
}

//! Shared `ureq` plumbing for the upstream clients.

use std::io::Read;
use std::time::Duration;

use crate::error::{BackupError, Result};

pub(crate) const USER_AGENT: &str = concat!("video-backups/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
// Error bodies are echoed into reports; keep them readable.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

pub(crate) fn read_bytes(response: ureq::Response, url: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut body)
        .map_err(|err| BackupError::fetch(url, format!("reading response body: {err}")))?;
    Ok(body)
}

/// Resolves a call against a read-only upstream (playlist feed, video API).
/// Any non-success status counts as a fetch failure.
pub(crate) fn upstream_body(
    result: std::result::Result<ureq::Response, ureq::Error>,
    url: &str,
) -> Result<Vec<u8>> {
    match result {
        Ok(response) => read_bytes(response, url),
        Err(ureq::Error::Status(code, response)) => {
            let body = error_body(response);
            Err(BackupError::fetch(url, format!("status {code}: {body}")))
        }
        Err(ureq::Error::Transport(transport)) => Err(BackupError::fetch(url, transport)),
    }
}

pub(crate) fn error_body(response: ureq::Response) -> String {
    let mut body = response.into_string().unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body.trim().to_string()
}

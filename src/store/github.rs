//! GitHub Git Data API client.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{CommitInfo, FILE_MODE, ObjectStore, TreeEntry};
use crate::error::{BackupError, Result};
use crate::http;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const OK: u16 = 200;
const CREATED: u16 = 201;
// GitHub's answer to a non-fast-forward ref update without `force`.
const UNPROCESSABLE: u16 = 422;

#[derive(Deserialize)]
struct Sha {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: Sha,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
    tree: Sha,
    #[serde(default)]
    parents: Vec<Sha>,
}

pub struct GithubStore {
    agent: ureq::Agent,
    api_url: String,
    repo: String,
    token: String,
}

impl GithubStore {
    /// `repo` is `owner/name`.
    pub fn new(
        api_url: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            agent: http::agent(),
            api_url: api_url.into(),
            repo: repo.into(),
            token: token.into(),
        }
    }

    fn git_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/git/{suffix}",
            self.api_url.trim_end_matches('/'),
            self.repo
        )
    }

    /// Sends one API call and insists on exactly `expected` as the status.
    fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: &str,
        body: Option<Value>,
        expected: u16,
    ) -> Result<T> {
        debug!("{method} {url}");
        let request = self
            .agent
            .request(method, url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json");
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                return Err(BackupError::Status {
                    method,
                    url: url.to_string(),
                    status,
                    expected,
                    body: http::error_body(response),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(BackupError::fetch(url, transport));
            }
        };

        let status = response.status();
        let bytes = http::read_bytes(response, url)?;
        if status != expected {
            return Err(BackupError::Status {
                method,
                url: url.to_string(),
                status,
                expected,
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| BackupError::decode(format!("{method} {url} response"), err))
    }
}

impl ObjectStore for GithubStore {
    fn read_ref(&self, branch: &str) -> Result<String> {
        let url = self.git_url(&format!("refs/heads/{branch}"));
        let reference: RefResponse = self.send("GET", &url, None, OK)?;
        Ok(reference.object.sha)
    }

    fn read_commit(&self, sha: &str) -> Result<CommitInfo> {
        let url = self.git_url(&format!("commits/{sha}"));
        let commit: CommitResponse = self.send("GET", &url, None, OK)?;
        Ok(CommitInfo {
            sha: commit.sha,
            tree: commit.tree.sha,
            parents: commit.parents.into_iter().map(|parent| parent.sha).collect(),
        })
    }

    fn create_blob(&self, content: &[u8]) -> Result<String> {
        let url = self.git_url("blobs");
        let body = json!({
            "content": STANDARD.encode(content),
            "encoding": "base64",
        });
        let blob: Sha = self.send("POST", &url, Some(body), CREATED)?;
        Ok(blob.sha)
    }

    fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> Result<String> {
        let url = self.git_url("trees");
        let tree: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "path": entry.path,
                    "mode": FILE_MODE,
                    "type": "blob",
                    "sha": entry.blob,
                })
            })
            .collect();
        let body = json!({ "base_tree": base_tree, "tree": tree });
        let created: Sha = self.send("POST", &url, Some(body), CREATED)?;
        Ok(created.sha)
    }

    fn create_commit(&self, message: &str, tree: &str, parents: &[String]) -> Result<String> {
        let url = self.git_url("commits");
        let body = json!({ "message": message, "tree": tree, "parents": parents });
        let commit: Sha = self.send("POST", &url, Some(body), CREATED)?;
        Ok(commit.sha)
    }

    /// The API has no conditional ref update, so the head is re-read and
    /// compared first, and the PATCH itself refuses non-fast-forward moves.
    /// Together these reject a branch that moved since `expected` was read.
    /// A rejected PATCH is only a conflict if the head really moved; any other
    /// 422 keeps its status error.
    fn update_ref(&self, branch: &str, new_commit: &str, expected: &str) -> Result<()> {
        let current = self.read_ref(branch)?;
        if current != expected {
            return Err(BackupError::StoreConflict {
                branch: branch.to_string(),
                expected: expected.to_string(),
                actual: current,
            });
        }

        let url = self.git_url(&format!("refs/heads/{branch}"));
        let body = json!({ "sha": new_commit, "force": false });
        match self.send::<RefResponse>("PATCH", &url, Some(body), OK) {
            Ok(_) => Ok(()),
            Err(
                rejected @ BackupError::Status {
                    status: UNPROCESSABLE,
                    ..
                },
            ) => {
                let actual = self.read_ref(branch)?;
                if actual == expected {
                    return Err(rejected);
                }
                Err(BackupError::StoreConflict {
                    branch: branch.to_string(),
                    expected: expected.to_string(),
                    actual,
                })
            }
            Err(err) => Err(err),
        }
    }
}

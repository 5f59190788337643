//! Version-control backend client
//!
//! Commits snapshot files through a GitHub-like contents API. Writes are
//! optimistic: the current blob sha is read first, and if the backend
//! reports that the ref moved underneath us (409) the commit is re-read
//! and retried exactly once before surfacing `ConcurrentModification`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use tracing::{debug, info, warn};

use flowvault_core::config::Config;
use flowvault_core::dto::vcs::{ContentsEntry, PutContents, PutContentsResponse};

use crate::backoff::{BackoffPolicy, retry_with_backoff};
use crate::error::{ClientError, Result, classify_status};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("flowvault/", env!("CARGO_PKG_VERSION"));

/// Write access to the version-control backend.
#[async_trait]
pub trait VcsBackend: Send + Sync {
    /// Read a file from the configured branch. `None` means the file does
    /// not exist yet.
    async fn read_file(&self, path: &str) -> Result<Option<String>>;

    /// Commit `content` to `path` on the configured branch and return the
    /// new commit identifier.
    async fn commit_file(&self, path: &str, content: &str, message: &str) -> Result<String>;
}

/// HTTP client for the version-control contents API
#[derive(Debug, Clone)]
pub struct VcsClient {
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
    policy: BackoffPolicy,
    http: Client,
}

impl VcsClient {
    /// Create a client from the process configuration.
    ///
    /// Fails when the repository URL cannot be split into owner/repo;
    /// a config that passed validation never hits this.
    pub fn new(config: &Config) -> Result<Self> {
        let (owner, repo) = config.vcs_repo_path().ok_or_else(|| {
            ClientError::Parse(format!("unusable VCS repo URL: {}", config.vcs_repo_url))
        })?;
        Ok(Self {
            api_base: DEFAULT_API_BASE.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: config.vcs_branch.clone(),
            token: config.vcs_token.clone(),
            policy: BackoffPolicy::from_config(config),
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    /// Fetch the raw contents entry for `path`, or `None` on 404.
    async fn read_entry(&self, path: &str) -> Result<Option<ContentsEntry>> {
        let url = format!("{}?ref={}", self.contents_url(path), self.branch);
        let http = self.http.clone();
        let token = self.token.clone();

        retry_with_backoff(&self.policy, path, || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            async move {
                let response = http
                    .get(&url)
                    .bearer_auth(&token)
                    .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .send()
                    .await
                    .map_err(ClientError::transport)?;

                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                decode::<ContentsEntry>(response).await.map(Some)
            }
        })
        .await
    }

    /// Issue one contents PUT, returning the new commit sha.
    async fn put_contents(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<String>,
    ) -> Result<String> {
        let url = self.contents_url(path);
        let body = PutContents {
            message: message.to_string(),
            content: BASE64.encode(content.as_bytes()),
            branch: self.branch.clone(),
            sha,
        };
        let http = self.http.clone();
        let token = self.token.clone();

        retry_with_backoff(&self.policy, path, || {
            let http = http.clone();
            let url = url.clone();
            let token = token.clone();
            let body = body.clone();
            async move {
                let response = http
                    .put(&url)
                    .bearer_auth(&token)
                    .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .json(&body)
                    .send()
                    .await
                    .map_err(ClientError::transport)?;

                decode::<PutContentsResponse>(response)
                    .await
                    .map(|parsed| parsed.commit.sha)
            }
        })
        .await
    }
}

/// Check the status and deserialize a successful response body.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("invalid response body: {e}")));
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(classify_status(status.as_u16(), None, message))
}

/// The backend rejected the write because the blob sha moved since our read.
fn is_ref_conflict(err: &ClientError) -> bool {
    matches!(err, ClientError::RemoteRejected { status: 409, .. })
}

#[async_trait]
impl VcsBackend for VcsClient {
    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        let Some(entry) = self.read_entry(path).await? else {
            return Ok(None);
        };
        let raw = entry.content.ok_or_else(|| {
            ClientError::Parse(format!("contents entry for {path} is missing content"))
        })?;
        // The API wraps base64 at 60 columns.
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|e| ClientError::Parse(format!("invalid base64 content for {path}: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| ClientError::Parse(format!("non-UTF-8 content for {path}: {e}")))?;
        Ok(Some(text))
    }

    async fn commit_file(&self, path: &str, content: &str, message: &str) -> Result<String> {
        debug!(path, "reading current blob sha before commit");
        let sha = self.read_entry(path).await?.map(|e| e.sha);

        match self.put_contents(path, content, message, sha).await {
            Ok(commit) => {
                info!(path, commit, "committed snapshot");
                Ok(commit)
            }
            Err(e) if is_ref_conflict(&e) => {
                warn!(path, "blob sha moved during commit, re-reading once");
                let fresh = self.read_entry(path).await?.map(|e| e.sha);
                match self.put_contents(path, content, message, fresh).await {
                    Ok(commit) => {
                        info!(path, commit, "committed snapshot after re-read");
                        Ok(commit)
                    }
                    Err(e2) if is_ref_conflict(&e2) => Err(ClientError::ConcurrentModification {
                        path: path.to_string(),
                    }),
                    Err(e2) => Err(e2),
                }
            }
            Err(e) => Err(e),
        }
    }
}

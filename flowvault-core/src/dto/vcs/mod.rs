//! Version-control backend wire types (GitHub-like contents API)

use serde::{Deserialize, Serialize};

/// Response from `GET /repos/{owner}/{repo}/contents/{path}`.
///
/// `content` is base64 with embedded line breaks; `sha` is the blob sha
/// required for optimistic-concurrency updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsEntry {
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Request body for `PUT /repos/{owner}/{repo}/contents/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutContents {
    pub message: String,
    /// Base64-encoded file content
    pub content: String,
    pub branch: String,
    /// Blob sha of the file being replaced; omitted when creating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// Response body for a successful contents update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutContentsResponse {
    pub commit: CommitInfo,
}

/// Commit identifier returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
}

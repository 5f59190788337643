//! Remote workflow API wire types

use serde::{Deserialize, Serialize};

/// Paged list envelope returned by the remote workflow API.
///
/// The API nests results under a `data` key with an opaque pagination
/// cursor: `{"data": [...], "nextCursor": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowList {
    #[serde(default)]
    pub data: Vec<WorkflowSummary>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Summary entry from the workflow list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

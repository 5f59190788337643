//! Remote workflow API client
//!
//! Talks to the orchestration system's REST API. Authentication uses a
//! custom API-key header whose name comes from configuration, since the
//! remote does not speak a standard bearer scheme. The key itself never
//! appears in logs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, info};

use flowvault_core::config::Config;
use flowvault_core::dto::workflow::{WorkflowList, WorkflowSummary};

use crate::backoff::{BackoffPolicy, retry_with_backoff};
use crate::error::{ClientError, Result, classify_status};

/// Read/write access to workflow definitions on the remote system.
///
/// The backup engine depends on this trait rather than the concrete HTTP
/// client so tests can substitute in-memory fakes.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Export the full definition of one workflow.
    async fn fetch_workflow(&self, id: &str) -> Result<Value>;

    /// Replace the definition of one workflow.
    async fn push_workflow(&self, id: &str, payload: &Value) -> Result<()>;

    /// List workflow summaries, up to `limit` entries.
    async fn list_workflows(&self, limit: usize) -> Result<Vec<WorkflowSummary>>;
}

/// HTTP client for the remote workflow API
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    /// Normalized base URL, always ending in `/api/v1`
    base_url: String,
    api_key_header: String,
    api_key: String,
    policy: BackoffPolicy,
    http: Client,
}

impl WorkflowClient {
    /// Create a client from the process configuration.
    pub fn new(config: &Config) -> Self {
        let base_url = normalize_base_url(&config.remote_base_url);
        info!(%base_url, "initialized workflow client");
        Self {
            base_url,
            api_key_header: config.remote_api_key_header.clone(),
            api_key: config.remote_api_key.clone(),
            policy: BackoffPolicy::from_config(config),
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Get the normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one API call with retry, returning the decoded JSON body.
    async fn request_json(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let http = self.http.clone();
        let header = self.api_key_header.clone();
        let key = self.api_key.clone();

        debug!(%method, path, "remote API request");

        retry_with_backoff(&self.policy, path, || {
            let http = http.clone();
            let method = method.clone();
            let url = url.clone();
            let header = header.clone();
            let key = key.clone();
            let body = body.clone();
            async move {
                let mut request = http
                    .request(method, &url)
                    .header(&header, &key)
                    .header(reqwest::header::ACCEPT, "application/json");
                if let Some(body) = &body {
                    request = request.json(body);
                }
                let response = request.send().await.map_err(ClientError::transport)?;
                decode_json(response).await
            }
        })
        .await
    }
}

#[async_trait]
impl WorkflowSource for WorkflowClient {
    async fn fetch_workflow(&self, id: &str) -> Result<Value> {
        let mut payload = self
            .request_json(Method::GET, &format!("/workflows/{id}"), None)
            .await?;
        // Credential references never leave the client.
        sanitize_credentials(&mut payload);
        Ok(payload)
    }

    async fn push_workflow(&self, id: &str, payload: &Value) -> Result<()> {
        self.request_json(
            Method::PUT,
            &format!("/workflows/{id}"),
            Some(payload.clone()),
        )
        .await?;
        info!(workflow_id = id, "pushed workflow definition");
        Ok(())
    }

    async fn list_workflows(&self, limit: usize) -> Result<Vec<WorkflowSummary>> {
        let value = self
            .request_json(Method::GET, &format!("/workflows?limit={limit}"), None)
            .await?;
        parse_workflow_list(value)
    }
}

/// Normalize the base URL so API paths can be appended directly.
///
/// The remote serves its API under `/api/v1`:
/// - `http://localhost:5678` → `http://localhost:5678/api/v1`
/// - `https://flows.example.com/` → `https://flows.example.com/api/v1`
/// - `http://localhost:5678/api/v1` → unchanged
fn normalize_base_url(raw: &str) -> String {
    let url = raw.trim_end_matches('/');
    if url.ends_with("/api/v1") {
        url.to_string()
    } else {
        format!("{url}/api/v1")
    }
}

/// Decode a response body, mapping error statuses to the client taxonomy.
async fn decode_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("invalid JSON body: {e}")));
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());

    Err(classify_status(status.as_u16(), retry_after, message))
}

/// Parse a workflow listing, accepting both the nested `{"data": [...]}`
/// envelope and a bare array.
fn parse_workflow_list(value: Value) -> Result<Vec<WorkflowSummary>> {
    if value.is_array() {
        return serde_json::from_value(value)
            .map_err(|e| ClientError::Parse(format!("invalid workflow list: {e}")));
    }
    if value.is_object() && value.get("data").is_some() {
        let list: WorkflowList = serde_json::from_value(value)
            .map_err(|e| ClientError::Parse(format!("invalid workflow list: {e}")))?;
        return Ok(list.data);
    }
    Err(ClientError::Parse(
        "workflow list response was neither an array nor a data envelope".to_string(),
    ))
}

/// Replace credential references embedded in workflow nodes with
/// placeholders so exported payloads can be committed safely.
fn sanitize_credentials(payload: &mut Value) {
    let Some(nodes) = payload.get_mut("nodes").and_then(Value::as_array_mut) else {
        return;
    };
    for node in nodes {
        let Some(creds) = node.get_mut("credentials").and_then(Value::as_object_mut) else {
            continue;
        };
        for slot in creds.values_mut() {
            *slot = serde_json::json!({
                "id": "REDACTED",
                "name": "CREDENTIAL_PLACEHOLDER",
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:5678"),
            "http://localhost:5678/api/v1"
        );
        assert_eq!(
            normalize_base_url("https://flows.example.com/"),
            "https://flows.example.com/api/v1"
        );
        assert_eq!(
            normalize_base_url("http://localhost:5678/api/v1"),
            "http://localhost:5678/api/v1"
        );
    }

    #[test]
    fn test_parse_list_from_envelope() {
        let value = json!({"data": [{"id": "wf-1", "name": "A"}], "nextCursor": null});
        let list = parse_workflow_list(value).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "wf-1");
    }

    #[test]
    fn test_parse_list_from_bare_array() {
        let value = json!([{"id": "wf-2", "name": "B", "active": true}]);
        let list = parse_workflow_list(value).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].active);
    }

    #[test]
    fn test_parse_list_rejects_other_shapes() {
        let err = parse_workflow_list(json!("nope")).unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_sanitize_replaces_credential_slots() {
        let mut payload = json!({
            "name": "wf",
            "nodes": [
                {"id": "n1", "credentials": {"httpAuth": {"id": "cred-7", "name": "prod key"}}},
                {"id": "n2"}
            ],
            "connections": {}
        });
        sanitize_credentials(&mut payload);
        assert_eq!(
            payload["nodes"][0]["credentials"]["httpAuth"]["id"],
            "REDACTED"
        );
        assert!(payload["nodes"][1].get("credentials").is_none());
    }

    #[test]
    fn test_sanitize_tolerates_payloads_without_nodes() {
        let mut payload = json!({"name": "wf"});
        sanitize_credentials(&mut payload);
        assert_eq!(payload, json!({"name": "wf"}));
    }
}

//! Error types for the Flowvault clients

use std::time::Duration;

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the workflow and version-control clients
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, reset, timeout) or a server
    /// error. Retried automatically up to the configured budget.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The backend rejected our credentials (401/403). A configuration
    /// problem, never retried.
    #[error("authentication failed (status {status}): {message}")]
    RemoteAuthFailed { status: u16, message: String },

    /// Non-retryable request error (4xx other than 401/403/429), with
    /// whatever detail the backend provided.
    #[error("request rejected (status {status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The backend throttled us. Retried, honoring the server-provided
    /// delay when one was sent.
    #[error("rate limited by remote")]
    RateLimited { retry_after: Option<Duration> },

    /// A commit lost the optimistic-concurrency race twice in a row.
    #[error("concurrent modification of {path}")]
    ConcurrentModification { path: String },

    /// Response body did not match the expected shape
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl ClientError {
    /// Wrap a transport failure from the HTTP layer.
    pub fn transport(err: reqwest::Error) -> Self {
        Self::RemoteUnavailable(err.to_string())
    }

    /// Machine-readable error kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteUnavailable(_) => "remote_unavailable",
            Self::RemoteAuthFailed { .. } => "remote_auth_failed",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::RateLimited { .. } => "rate_limited",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::Parse(_) => "parse_error",
        }
    }

    /// Whether the retry loop may try this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable(_) | Self::RateLimited { .. }
        )
    }

    /// Server-mandated delay before the next attempt, if any.
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Map an HTTP error status to the client error taxonomy.
///
/// 401/403 signal a configuration problem and are never retried; 429 is
/// retried with the `Retry-After` hint when present; any other 4xx fails
/// immediately; 5xx is treated as transient.
pub(crate) fn classify_status(
    status: u16,
    retry_after: Option<Duration>,
    message: String,
) -> ClientError {
    match status {
        401 | 403 => ClientError::RemoteAuthFailed { status, message },
        429 => ClientError::RateLimited { retry_after },
        s if (400..500).contains(&s) => ClientError::RemoteRejected { status, message },
        s => ClientError::RemoteUnavailable(format!("server error (status {s}): {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses_never_retryable() {
        for status in [401, 403] {
            let err = classify_status(status, None, "denied".to_string());
            assert_eq!(err.kind(), "remote_auth_failed");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500, 502, 503] {
            let err = classify_status(status, None, "boom".to_string());
            assert_eq!(err.kind(), "remote_unavailable");
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_rate_limit_carries_hint() {
        let err = classify_status(429, Some(Duration::from_secs(7)), String::new());
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_hint(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_other_client_errors_fail_fast() {
        let err = classify_status(422, None, "bad field".to_string());
        assert_eq!(err.kind(), "remote_rejected");
        assert!(!err.is_retryable());
    }
}

//! Exponential backoff retry for client calls.
//!
//! Formula per retry: `min(base * 2^retry, max) + jitter`, where jitter is
//! a deterministic fraction of the capped delay. A server-provided
//! `Retry-After` hint overrides the computed delay for that attempt.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Backoff configuration shared by both clients.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first try
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each retry
    pub base_delay: Duration,
    /// Upper bound on a single delay
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay (0.0–1.0). Must stay
    /// below 1.0 so delays remain non-decreasing while doubling.
    pub jitter_fraction: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Build the policy from process configuration.
    pub fn from_config(config: &flowvault_core::config::Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            base_delay: config.retry_base_delay(),
            ..Self::default()
        }
    }

    /// Policy suitable for unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter_fraction: 0.0,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let raw = base * 2f64.powi(retry as i32);
        let capped = raw.min(self.max_delay.as_millis() as f64);
        let jitter = pseudo_rand(retry) * self.jitter_fraction * capped;
        Duration::from_millis((capped + jitter) as u64)
    }
}

/// Produce a float in [0, 1) from `seed` using a single LCG step.
///
/// Deterministic on purpose: the spread is enough to avoid synchronized
/// retries without pulling in a random-number dependency, and tests stay
/// reproducible.
fn pseudo_rand(seed: u32) -> f64 {
    const A: u64 = 1_664_525;
    const C: u64 = 1_013_904_223;
    const M: u64 = 1u64 << 32;
    let state = A.wrapping_mul(seed as u64).wrapping_add(C) % M;
    state as f64 / M as f64
}

/// Retry an async client operation with exponential backoff.
///
/// Calls `f()` up to `policy.max_attempts` times. Non-retryable errors
/// (auth failures, 4xx rejections) are returned immediately with zero
/// retries. Once the budget is exhausted the last transient error is
/// wrapped in [`ClientError::RemoteUnavailable`] with the attempt count.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &BackoffPolicy,
    op: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_err: Option<ClientError> = None;

    for attempt in 1..=max_attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(op, attempt, "retry succeeded");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt < max_attempts {
                    let delay = e
                        .retry_after_hint()
                        .unwrap_or_else(|| policy.delay_for(attempt - 1));
                    warn!(
                        op,
                        attempt,
                        max = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }

    let detail = last_err
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no attempts made".to_string());
    Err(ClientError::RemoteUnavailable(format!(
        "retry budget exhausted after {max_attempts} attempts: {detail}"
    )))
}

//! Diagnostic report domain types

use serde::{Deserialize, Serialize};

/// Health classification for a single probe.
///
/// Ordered so that the worst status compares greatest:
/// `Healthy < Degraded < Failing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Degraded,
    Failing,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProbeStatus::Healthy => "healthy",
            ProbeStatus::Degraded => "degraded",
            ProbeStatus::Failing => "failing",
        };
        f.write_str(name)
    }
}

/// Result of one independent health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub name: String,
    pub status: ProbeStatus,
    pub message: String,
    /// Human-readable fix, when the failure signature is a known one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Aggregated system health report.
///
/// Reports are ephemeral; they are only serialized when the caller asks
/// for an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub probes: Vec<ProbeResult>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl DiagnosticReport {
    pub fn new(probes: Vec<ProbeResult>) -> Self {
        Self {
            probes,
            generated_at: chrono::Utc::now(),
        }
    }

    /// Overall status: the worst status among all probes.
    ///
    /// An empty report is healthy.
    pub fn overall(&self) -> ProbeStatus {
        self.probes
            .iter()
            .map(|p| p.status)
            .max()
            .unwrap_or(ProbeStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(name: &str, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            name: name.to_string(),
            status,
            message: String::new(),
            remediation: None,
            checked_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_overall_is_worst_status() {
        let report = DiagnosticReport::new(vec![
            probe("a", ProbeStatus::Healthy),
            probe("b", ProbeStatus::Failing),
            probe("c", ProbeStatus::Degraded),
        ]);
        assert_eq!(report.overall(), ProbeStatus::Failing);
    }

    #[test]
    fn test_overall_degraded_beats_healthy() {
        let report = DiagnosticReport::new(vec![
            probe("a", ProbeStatus::Healthy),
            probe("b", ProbeStatus::Degraded),
        ]);
        assert_eq!(report.overall(), ProbeStatus::Degraded);
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = DiagnosticReport::new(vec![]);
        assert_eq!(report.overall(), ProbeStatus::Healthy);
    }
}

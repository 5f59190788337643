//! Backup ledger domain types

use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of the backup state machine in which an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupPhase {
    Exporting,
    Validating,
    Committing,
    Recording,
}

impl std::fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BackupPhase::Exporting => "exporting",
            BackupPhase::Validating => "validating",
            BackupPhase::Committing => "committing",
            BackupPhase::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Outcome of a single backup attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BackupOutcome {
    /// A new snapshot was created. `commit_ref` is absent only for dry runs.
    Succeeded {
        version: Version,
        content_hash: String,
        commit_ref: Option<String>,
    },
    /// Upstream content was identical to the latest snapshot; no remote
    /// write happened. Recorded for the audit trail.
    Unchanged {
        version: Version,
        content_hash: String,
    },
    /// The attempt failed in `phase` with a machine-readable error kind.
    Failed {
        phase: BackupPhase,
        error_kind: String,
        message: String,
    },
    /// The caller cancelled mid-flight.
    Cancelled { phase: BackupPhase },
}

/// One entry in the append-only backup ledger.
///
/// Records are never mutated after creation and are ordered by
/// `created_at`, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub workflow_id: String,
    #[serde(flatten)]
    pub outcome: BackupOutcome,
    pub dry_run: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl BackupRecord {
    pub fn new(workflow_id: impl Into<String>, outcome: BackupOutcome, dry_run: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: workflow_id.into(),
            outcome,
            dry_run,
            created_at: chrono::Utc::now(),
        }
    }

    /// Version this record points at, when the attempt produced one.
    pub fn version(&self) -> Option<&Version> {
        match &self.outcome {
            BackupOutcome::Succeeded { version, .. } | BackupOutcome::Unchanged { version, .. } => {
                Some(version)
            }
            _ => None,
        }
    }

    /// Content hash this record points at, when the attempt produced one.
    pub fn content_hash(&self) -> Option<&str> {
        match &self.outcome {
            BackupOutcome::Succeeded { content_hash, .. }
            | BackupOutcome::Unchanged { content_hash, .. } => Some(content_hash),
            _ => None,
        }
    }

    /// Commit identifier, for successful non-dry-run attempts.
    pub fn commit_ref(&self) -> Option<&str> {
        match &self.outcome {
            BackupOutcome::Succeeded { commit_ref, .. } => commit_ref.as_deref(),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BackupOutcome::Succeeded { .. })
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self.outcome, BackupOutcome::Unchanged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrips_through_json() {
        let record = BackupRecord::new(
            "wf-1",
            BackupOutcome::Succeeded {
                version: Version::new(0, 1, 1),
                content_hash: "abc123".to_string(),
                commit_ref: Some("deadbeef".to_string()),
            },
            false,
        );

        let line = serde_json::to_string(&record).unwrap();
        let parsed: BackupRecord = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.workflow_id, "wf-1");
        assert_eq!(parsed.version(), Some(&Version::new(0, 1, 1)));
        assert!(parsed.is_success());
    }

    #[test]
    fn test_failed_record_carries_phase_and_kind() {
        let record = BackupRecord::new(
            "wf-1",
            BackupOutcome::Failed {
                phase: BackupPhase::Exporting,
                error_kind: "remote_unavailable".to_string(),
                message: "connection refused".to_string(),
            },
            false,
        );

        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"outcome\":\"failed\""));
        assert!(line.contains("\"phase\":\"exporting\""));
        assert!(record.version().is_none());
    }
}

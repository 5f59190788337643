//! Snapshot store
//!
//! Owns the append-only ledger and the version-increment algorithm, and
//! validates payload structure before anything is written. All ledger
//! mutation goes through this type; the orchestrator serializes access
//! per workflow id.

use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use flowvault_core::domain::backup::{BackupOutcome, BackupRecord};
use flowvault_core::domain::snapshot::{self, BumpLevel, WorkflowSnapshot};

use crate::ledger::Ledger;

/// Errors from the snapshot store and ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Payload failed structural validation. The message cites the first
    /// violation found.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("ledger line {line} is corrupt: {detail}")]
    CorruptLedger { line: usize, detail: String },

    #[error("no successful backup with version {0}")]
    UnknownVersion(Version),

    /// The payload file was pruned by retention. The snapshot itself is
    /// still available in version-control history.
    #[error("payload for version {0} was pruned locally (retained in version-control history)")]
    PayloadPruned(Version),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// Machine-readable error kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::CorruptLedger { .. } => "ledger_corrupt",
            Self::UnknownVersion(_) => "unknown_version",
            Self::PayloadPruned(_) => "payload_pruned",
            Self::Io(_) => "io_error",
            Self::Serde(_) => "serde_error",
        }
    }
}

/// What a backup of a given payload would do, decided before any write.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    pub version: Version,
    pub content_hash: String,
    /// Content is identical to the latest snapshot; the commit step can
    /// be skipped entirely.
    pub unchanged: bool,
}

/// Versioned snapshot storage over a backup directory.
///
/// Layout: `<backup_dir>/ledger.jsonl` plus one payload file per version
/// under `<backup_dir>/snapshots/<workflow-id>/`.
pub struct SnapshotStore {
    backup_dir: PathBuf,
    retention_count: usize,
    ledger: Ledger,
    records: Vec<BackupRecord>,
}

impl SnapshotStore {
    /// Open the store, creating the directory and replaying the ledger.
    pub fn open(
        backup_dir: impl Into<PathBuf>,
        retention_count: usize,
    ) -> Result<Self, StoreError> {
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir)?;
        let (ledger, records) = Ledger::open(backup_dir.join("ledger.jsonl"))?;
        debug!(records = records.len(), dir = %backup_dir.display(), "opened snapshot store");
        Ok(Self {
            backup_dir,
            retention_count,
            ledger,
            records,
        })
    }

    /// All ledger records, oldest first.
    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    pub fn ledger_path(&self) -> &Path {
        self.ledger.path()
    }

    /// Latest recorded version and content hash for a workflow.
    pub fn latest(&self, workflow_id: &str) -> Option<(&Version, &str)> {
        self.records
            .iter()
            .rev()
            .filter(|r| r.workflow_id == workflow_id && !r.dry_run)
            .find_map(|r| match &r.outcome {
                BackupOutcome::Succeeded {
                    version,
                    content_hash,
                    ..
                }
                | BackupOutcome::Unchanged {
                    version,
                    content_hash,
                } => Some((version, content_hash.as_str())),
                _ => None,
            })
    }

    /// Next version for a workflow: bump the latest, or start fresh.
    pub fn next_version(&self, workflow_id: &str, bump: BumpLevel) -> Version {
        match self.latest(workflow_id) {
            Some((version, _)) => bump.next(version),
            None => snapshot::initial_version(),
        }
    }

    /// Structural validation of an exported payload.
    ///
    /// Checks run in a fixed order and the first violation is the one
    /// reported: the payload must be a JSON object with a non-empty
    /// `name`, a `nodes` array, a `connections` object, and at least one
    /// node.
    pub fn validate_payload(payload: &Value) -> Result<(), StoreError> {
        let Some(object) = payload.as_object() else {
            return Err(StoreError::InvalidPayload(
                "payload is not a JSON object".to_string(),
            ));
        };

        match object.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => {}
            Some(_) => {
                return Err(StoreError::InvalidPayload(
                    "workflow name is empty".to_string(),
                ));
            }
            None => {
                return Err(StoreError::InvalidPayload(
                    "missing 'name' field".to_string(),
                ));
            }
        }

        let Some(nodes) = object.get("nodes").and_then(Value::as_array) else {
            return Err(StoreError::InvalidPayload(
                "missing 'nodes' array".to_string(),
            ));
        };

        if object.get("connections").and_then(Value::as_object).is_none() {
            return Err(StoreError::InvalidPayload(
                "missing 'connections' object".to_string(),
            ));
        }

        if nodes.is_empty() {
            return Err(StoreError::InvalidPayload(
                "workflow has no nodes".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate `payload` and decide what backing it up would do.
    ///
    /// When the content hash matches the immediately preceding snapshot
    /// the plan is flagged `unchanged` and keeps the existing version, so
    /// re-running a backup with no upstream change performs zero remote
    /// writes. `force` overrides that and assigns a fresh version anyway.
    pub fn plan_backup(
        &self,
        workflow_id: &str,
        payload: &Value,
        bump: BumpLevel,
        force: bool,
    ) -> Result<BackupPlan, StoreError> {
        Self::validate_payload(payload)?;
        let content_hash = snapshot::content_hash(payload);

        if !force
            && let Some((version, prior_hash)) = self.latest(workflow_id)
            && prior_hash == content_hash
        {
            return Ok(BackupPlan {
                version: version.clone(),
                content_hash,
                unchanged: true,
            });
        }

        Ok(BackupPlan {
            version: self.next_version(workflow_id, bump),
            content_hash,
            unchanged: false,
        })
    }

    /// Persist a snapshot payload locally, then prune files beyond the
    /// retention count.
    pub fn store_snapshot(&mut self, snapshot: &WorkflowSnapshot) -> Result<(), StoreError> {
        let dir = self.snapshots_dir(&snapshot.workflow_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", snapshot.version));
        fs::write(&path, serde_json::to_vec_pretty(&snapshot.payload)?)?;
        debug!(path = %path.display(), "stored snapshot payload");
        self.prune_payloads(&snapshot.workflow_id)?;
        Ok(())
    }

    /// Append one record to the ledger. The only mutation path for
    /// history; records are never rewritten.
    pub fn record(&mut self, record: BackupRecord) -> Result<(), StoreError> {
        self.ledger.append(&record)?;
        self.records.push(record);
        Ok(())
    }

    /// Rebuild a snapshot: metadata from the ledger, payload from disk.
    pub fn load_snapshot(
        &self,
        workflow_id: &str,
        version: &Version,
    ) -> Result<WorkflowSnapshot, StoreError> {
        let record = self
            .records
            .iter()
            .rev()
            .find(|r| {
                r.workflow_id == workflow_id
                    && !r.dry_run
                    && r.is_success()
                    && r.version() == Some(version)
            })
            .ok_or_else(|| StoreError::UnknownVersion(version.clone()))?;

        let path = self
            .snapshots_dir(workflow_id)
            .join(format!("{version}.json"));
        if !path.exists() {
            return Err(StoreError::PayloadPruned(version.clone()));
        }
        let payload: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;

        Ok(WorkflowSnapshot {
            workflow_id: workflow_id.to_string(),
            version: version.clone(),
            payload,
            content_hash: record.content_hash().unwrap_or_default().to_string(),
            created_at: record.created_at,
            commit_ref: record.commit_ref().map(str::to_string),
        })
    }

    fn snapshots_dir(&self, workflow_id: &str) -> PathBuf {
        self.backup_dir.join("snapshots").join(workflow_id)
    }

    /// Delete payload files beyond the newest `retention_count` versions.
    /// Ledger records are never pruned.
    fn prune_payloads(&self, workflow_id: &str) -> Result<(), StoreError> {
        let dir = self.snapshots_dir(workflow_id);
        let mut versions: Vec<Version> = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(version) = stem.parse::<Version>() {
                versions.push(version);
            }
        }
        if versions.len() <= self.retention_count {
            return Ok(());
        }

        versions.sort();
        let excess = versions.len() - self.retention_count;
        for version in versions.into_iter().take(excess) {
            let path = dir.join(format!("{version}.json"));
            fs::remove_file(&path)?;
            info!(workflow_id, %version, "pruned snapshot payload beyond retention");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(marker: &str) -> Value {
        json!({
            "name": "mail sync",
            "nodes": [{"id": marker}],
            "connections": {},
        })
    }

    fn succeeded(workflow_id: &str, version: Version, hash: &str) -> BackupRecord {
        BackupRecord::new(
            workflow_id,
            BackupOutcome::Succeeded {
                version,
                content_hash: hash.to_string(),
                commit_ref: Some("c0ffee".to_string()),
            },
            false,
        )
    }

    fn open_store(dir: &tempfile::TempDir) -> SnapshotStore {
        SnapshotStore::open(dir.path(), 30).unwrap()
    }

    #[test]
    fn test_validation_cites_first_violation() {
        let cases = [
            (json!([1, 2]), "not a JSON object"),
            (json!({"nodes": [], "connections": {}}), "missing 'name'"),
            (
                json!({"name": "  ", "nodes": [], "connections": {}}),
                "name is empty",
            ),
            (json!({"name": "wf", "connections": {}}), "missing 'nodes'"),
            (json!({"name": "wf", "nodes": []}), "missing 'connections'"),
            (
                json!({"name": "wf", "nodes": [], "connections": {}}),
                "no nodes",
            ),
        ];
        for (payload, expected) in cases {
            let err = SnapshotStore::validate_payload(&payload).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "expected '{expected}' in '{err}'"
            );
        }
    }

    #[test]
    fn test_first_backup_starts_at_initial_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let plan = store
            .plan_backup("wf-1", &payload("n1"), BumpLevel::Patch, false)
            .unwrap();
        assert_eq!(plan.version, Version::new(0, 1, 0));
        assert!(!plan.unchanged);
    }

    #[test]
    fn test_unchanged_payload_keeps_version_and_flags_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let body = payload("n1");
        let hash = snapshot::content_hash(&body);
        store
            .record(succeeded("wf-1", Version::new(0, 1, 0), &hash))
            .unwrap();

        let plan = store
            .plan_backup("wf-1", &body, BumpLevel::Patch, false)
            .unwrap();
        assert!(plan.unchanged);
        assert_eq!(plan.version, Version::new(0, 1, 0));
    }

    #[test]
    fn test_force_assigns_fresh_version_despite_same_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let body = payload("n1");
        let hash = snapshot::content_hash(&body);
        store
            .record(succeeded("wf-1", Version::new(0, 1, 0), &hash))
            .unwrap();

        let plan = store
            .plan_backup("wf-1", &body, BumpLevel::Patch, true)
            .unwrap();
        assert!(!plan.unchanged);
        assert_eq!(plan.version, Version::new(0, 1, 1));
    }

    #[test]
    fn test_changed_payload_bumps_requested_component() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let hash = snapshot::content_hash(&payload("n1"));
        store
            .record(succeeded("wf-1", Version::new(0, 1, 3), &hash))
            .unwrap();

        let plan = store
            .plan_backup("wf-1", &payload("n2"), BumpLevel::Minor, false)
            .unwrap();
        assert_eq!(plan.version, Version::new(0, 2, 0));
    }

    #[test]
    fn test_dry_run_records_do_not_advance_versions() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let dry = BackupRecord::new(
            "wf-1",
            BackupOutcome::Succeeded {
                version: Version::new(0, 1, 0),
                content_hash: "h".to_string(),
                commit_ref: None,
            },
            true,
        );
        store.record(dry).unwrap();
        assert!(store.latest("wf-1").is_none());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(&dir);
            store
                .record(succeeded("wf-1", Version::new(0, 1, 0), "h1"))
                .unwrap();
            store
                .record(succeeded("wf-1", Version::new(0, 1, 1), "h2"))
                .unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.records().len(), 2);
        let (latest, hash) = store.latest("wf-1").unwrap();
        assert_eq!(latest, &Version::new(0, 1, 1));
        assert_eq!(hash, "h2");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir);
        let body = payload("n1");
        let hash = snapshot::content_hash(&body);
        let snap = WorkflowSnapshot {
            workflow_id: "wf-1".to_string(),
            version: Version::new(0, 1, 0),
            payload: body,
            content_hash: hash.clone(),
            created_at: chrono::Utc::now(),
            commit_ref: Some("c0ffee".to_string()),
        };
        store.store_snapshot(&snap).unwrap();
        store
            .record(succeeded("wf-1", Version::new(0, 1, 0), &hash))
            .unwrap();

        let loaded = store
            .load_snapshot("wf-1", &Version::new(0, 1, 0))
            .unwrap();
        assert_eq!(loaded.content_hash, hash);
        assert_eq!(snapshot::content_hash(&loaded.payload), hash);
        assert_eq!(loaded.commit_ref.as_deref(), Some("c0ffee"));
    }

    #[test]
    fn test_unknown_version_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir);
        let err = store
            .load_snapshot("wf-1", &Version::new(9, 9, 9))
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_version");
    }

    #[test]
    fn test_retention_prunes_payload_files_but_not_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path(), 2).unwrap();

        for patch in 0..4u64 {
            let body = payload(&format!("n{patch}"));
            let hash = snapshot::content_hash(&body);
            let version = Version::new(0, 1, patch);
            let snap = WorkflowSnapshot {
                workflow_id: "wf-1".to_string(),
                version: version.clone(),
                payload: body,
                content_hash: hash.clone(),
                created_at: chrono::Utc::now(),
                commit_ref: Some(format!("c{patch}")),
            };
            store.store_snapshot(&snap).unwrap();
            store.record(succeeded("wf-1", version, &hash)).unwrap();
        }

        // Ledger keeps everything; only the two newest payloads remain.
        assert_eq!(store.records().len(), 4);
        let err = store
            .load_snapshot("wf-1", &Version::new(0, 1, 0))
            .unwrap_err();
        assert_eq!(err.kind(), "payload_pruned");
        assert!(store.load_snapshot("wf-1", &Version::new(0, 1, 3)).is_ok());
    }
}

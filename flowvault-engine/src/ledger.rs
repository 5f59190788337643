//! Append-only ledger persistence
//!
//! One JSON record per line, oldest first, so external tooling can replay
//! or audit the backup history without going through this crate.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use flowvault_core::domain::backup::BackupRecord;

use crate::store::StoreError;

/// Handle to the ledger file. Appends only; existing lines are never
/// rewritten.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Open (or create) a ledger and replay its records.
    ///
    /// A line that fails to parse aborts the load with
    /// [`StoreError::CorruptLedger`] naming the offending line number.
    pub fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<BackupRecord>), StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut records = Vec::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            for (idx, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record = serde_json::from_str(line).map_err(|e| StoreError::CorruptLedger {
                    line: idx + 1,
                    detail: e.to_string(),
                })?;
                records.push(record);
            }
        }

        Ok((Self { path }, records))
    }

    /// Append one record as a new line.
    pub fn append(&self, record: &BackupRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowvault_core::domain::backup::{BackupOutcome, BackupPhase};

    fn failed_record(workflow_id: &str) -> BackupRecord {
        BackupRecord::new(
            workflow_id,
            BackupOutcome::Failed {
                phase: BackupPhase::Exporting,
                error_kind: "remote_unavailable".to_string(),
                message: "connection refused".to_string(),
            },
            false,
        )
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let (ledger, records) = Ledger::open(&path).unwrap();
        assert!(records.is_empty());

        ledger.append(&failed_record("wf-1")).unwrap();
        ledger.append(&failed_record("wf-2")).unwrap();

        let (_, replayed) = Ledger::open(&path).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].workflow_id, "wf-1");
        assert_eq!(replayed[1].workflow_id, "wf-2");
    }

    #[test]
    fn test_corrupt_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let (ledger, _) = Ledger::open(&path).unwrap();
        ledger.append(&failed_record("wf-1")).unwrap();
        fs::write(
            &path,
            format!("{}not json\n", fs::read_to_string(&path).unwrap()),
        )
        .unwrap();

        let err = Ledger::open(&path).unwrap_err();
        match err {
            StoreError::CorruptLedger { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let (ledger, _) = Ledger::open(&path).unwrap();
        ledger.append(&failed_record("wf-1")).unwrap();
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push('\n');
        fs::write(&path, raw).unwrap();

        let (_, replayed) = Ledger::open(&path).unwrap();
        assert_eq!(replayed.len(), 1);
    }
}

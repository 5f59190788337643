//! Workflow snapshot domain types

use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Immutable, versioned capture of a workflow definition.
///
/// The payload is the workflow definition exactly as the remote system
/// serves it (minus sanitized credential references) and is never
/// interpreted beyond structural validation. Versions per workflow id form
/// a strictly increasing, gap-tolerant sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// Stable workflow identifier assigned by the remote system
    pub workflow_id: String,
    /// Snapshot version, monotonically increasing per workflow id
    pub version: Version,
    /// Opaque serialized workflow definition
    pub payload: serde_json::Value,
    /// Hex SHA-256 digest of the canonical payload serialization
    pub content_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Commit identifier returned by the version-control backend.
    /// Absent for snapshots that were never committed (dry runs).
    pub commit_ref: Option<String>,
}

/// Which semver component a backup should bump.
///
/// Backups bump the patch component unless the caller asks otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    #[default]
    Patch,
    Minor,
    Major,
}

impl BumpLevel {
    /// Compute the successor of `version` at this bump level.
    ///
    /// Versions are never reused or decremented, so the result is always
    /// strictly greater than the input.
    pub fn next(self, version: &Version) -> Version {
        match self {
            BumpLevel::Patch => Version::new(version.major, version.minor, version.patch + 1),
            BumpLevel::Minor => Version::new(version.major, version.minor + 1, 0),
            BumpLevel::Major => Version::new(version.major + 1, 0, 0),
        }
    }
}

/// Version assigned to the first snapshot of a workflow.
pub fn initial_version() -> Version {
    Version::new(0, 1, 0)
}

/// Hex SHA-256 digest of a payload's canonical JSON serialization.
///
/// `serde_json` keeps object keys sorted, so the same logical payload
/// always hashes to the same digest regardless of the key order the
/// remote system happened to return.
pub fn content_hash(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bump_levels() {
        let v = Version::new(1, 2, 3);
        assert_eq!(BumpLevel::Patch.next(&v), Version::new(1, 2, 4));
        assert_eq!(BumpLevel::Minor.next(&v), Version::new(1, 3, 0));
        assert_eq!(BumpLevel::Major.next(&v), Version::new(2, 0, 0));
    }

    #[test]
    fn test_bump_is_strictly_increasing() {
        let v = Version::new(0, 1, 0);
        for level in [BumpLevel::Patch, BumpLevel::Minor, BumpLevel::Major] {
            assert!(level.next(&v) > v);
        }
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a = json!({"name": "wf", "nodes": [], "connections": {}});
        let b = json!({"connections": {}, "nodes": [], "name": "wf"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_differs_on_change() {
        let a = json!({"name": "wf", "nodes": [{"id": "n1"}]});
        let b = json!({"name": "wf", "nodes": [{"id": "n2"}]});
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}

//! Remediation hint catalog
//!
//! Maps machine-readable failure signatures to human-readable fixes. The
//! mapping is data, not logic: operators extend or override it by placing
//! a JSON object of `{"signature": "hint"}` at
//! `<backup_dir>/remediation.json`, which is merged over the built-in
//! entries at load time. Unknown signatures yield no hint; callers are
//! expected to say so rather than invent one.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

const BUILTIN: &[(&str, &str)] = &[
    (
        "remote_auth_failed",
        "The remote rejected the API key. Verify FLOWVAULT_REMOTE_API_KEY and confirm \
         FLOWVAULT_REMOTE_API_KEY_HEADER matches what your instance expects (n8n uses \
         X-N8N-API-KEY, not an Authorization bearer header).",
    ),
    (
        "remote_unavailable",
        "The remote did not answer. Check FLOWVAULT_REMOTE_URL, confirm the service is \
         running, and re-run 'flowvault status system'.",
    ),
    (
        "remote_rejected",
        "The remote refused the request. Check that FLOWVAULT_WORKFLOW_ID names an \
         existing workflow.",
    ),
    (
        "rate_limited",
        "The remote is throttling requests. Wait and retry; consider raising \
         FLOWVAULT_RETRY_BASE_DELAY_MS.",
    ),
    (
        "concurrent_modification",
        "Another writer updated the backup repository mid-commit. Re-run the backup; if \
         this persists, check for a second flowvault instance pointed at the same \
         repository.",
    ),
    (
        "invalid_payload",
        "The exported workflow failed structural validation; the backup was aborted \
         before any write. Inspect the workflow in the remote editor.",
    ),
    (
        "backup_in_progress",
        "A backup for this workflow is already running. Wait for it to finish and retry.",
    ),
    (
        "ledger_corrupt",
        "The local ledger has an unreadable line. Move the ledger file aside and re-run; \
         committed snapshots remain in version-control history.",
    ),
    (
        "payload_pruned",
        "The local payload copy was pruned by retention. Fetch the file from \
         version-control history, or raise FLOWVAULT_BACKUP_RETENTION_COUNT.",
    ),
    (
        "invalid_configuration",
        "Run 'flowvault config validate' for the full list of violations, or \
         'flowvault config init' to generate a template.",
    ),
];

/// Signature → hint lookup table.
pub struct RemediationCatalog {
    hints: HashMap<String, String>,
}

impl RemediationCatalog {
    /// Catalog with only the built-in entries.
    pub fn builtin() -> Self {
        let hints = BUILTIN
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { hints }
    }

    /// Built-in entries merged with overrides from a JSON file, when one
    /// exists. An unreadable override file is logged and skipped; a bad
    /// hint file must not take diagnostics down with it.
    pub fn with_overrides(path: impl AsRef<Path>) -> Self {
        let mut catalog = Self::builtin();
        let path = path.as_ref();
        if !path.exists() {
            return catalog;
        }
        match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<HashMap<String, String>>(&raw).map_err(|e| e.to_string())
            }) {
            Ok(overrides) => catalog.hints.extend(overrides),
            Err(e) => warn!(path = %path.display(), err = %e, "ignoring unreadable remediation overrides"),
        }
        catalog
    }

    pub fn lookup(&self, signature: &str) -> Option<&str> {
        self.hints.get(signature).map(String::as_str)
    }
}

//! Diagnostics engine
//!
//! Runs a fixed set of independent, read-only health probes and folds
//! them into a [`DiagnosticReport`]. Probes run concurrently, each under
//! its own timeout, and one probe's failure never aborts the others:
//! a hung probe reports `failing: probe timeout` while the rest still
//! return their real results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use flowvault_client::{VcsBackend, WorkflowSource};
use flowvault_core::config::Config;
use flowvault_core::domain::report::{DiagnosticReport, ProbeResult, ProbeStatus};

use crate::ledger::Ledger;
use crate::remediation::RemediationCatalog;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe result before remediation lookup.
struct ProbeOutcome {
    status: ProbeStatus,
    message: String,
    /// Failure signature for the remediation catalog
    signature: Option<String>,
}

impl ProbeOutcome {
    fn healthy(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Healthy,
            message: message.into(),
            signature: None,
        }
    }

    fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Degraded,
            message: message.into(),
            signature: None,
        }
    }

    fn failing(message: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            status: ProbeStatus::Failing,
            message: message.into(),
            signature,
        }
    }
}

/// Read-only health checks over the same collaborators the backup path
/// uses. Safe to run concurrently with an in-flight backup.
pub struct DiagnosticsEngine {
    config: Arc<Config>,
    source: Arc<dyn WorkflowSource>,
    vcs: Arc<dyn VcsBackend>,
    remediation: RemediationCatalog,
    probe_timeout: Duration,
}

impl DiagnosticsEngine {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn WorkflowSource>,
        vcs: Arc<dyn VcsBackend>,
        remediation: RemediationCatalog,
    ) -> Self {
        Self {
            config,
            source,
            vcs,
            remediation,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the per-probe timeout.
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Run every probe and aggregate the report (worst status wins).
    pub async fn status_system(&self) -> DiagnosticReport {
        debug!("running system diagnostics");
        let (remote, vcs, local, environment) = tokio::join!(
            self.bounded("remote_api", self.probe_remote()),
            self.bounded("vcs_repository", self.probe_vcs()),
            self.bounded("local_state", self.probe_local()),
            self.bounded("environment", self.probe_environment()),
        );
        DiagnosticReport::new(vec![remote, vcs, local, environment])
    }

    /// Run one probe under the timeout and attach any known remediation.
    async fn bounded(
        &self,
        name: &str,
        probe: impl Future<Output = ProbeOutcome>,
    ) -> ProbeResult {
        let outcome = match timeout(self.probe_timeout, probe).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::failing("probe timeout", None),
        };
        let remediation = outcome
            .signature
            .as_deref()
            .and_then(|s| self.remediation.lookup(s))
            .map(str::to_string);
        ProbeResult {
            name: name.to_string(),
            status: outcome.status,
            message: outcome.message,
            remediation,
            checked_at: chrono::Utc::now(),
        }
    }

    async fn probe_remote(&self) -> ProbeOutcome {
        match self.source.list_workflows(1).await {
            Ok(workflows) => ProbeOutcome::healthy(format!(
                "remote API reachable ({} workflow(s) visible)",
                workflows.len()
            )),
            Err(e) => ProbeOutcome::failing(e.to_string(), Some(e.kind().to_string())),
        }
    }

    async fn probe_vcs(&self) -> ProbeOutcome {
        let path = format!("workflows/{}.json", self.config.remote_workflow_id);
        match self.vcs.read_file(&path).await {
            Ok(Some(_)) => ProbeOutcome::healthy("repository reachable, snapshot file present"),
            Ok(None) => {
                ProbeOutcome::healthy("repository reachable (no snapshot committed yet)")
            }
            Err(e) => ProbeOutcome::failing(e.to_string(), Some(e.kind().to_string())),
        }
    }

    async fn probe_local(&self) -> ProbeOutcome {
        let backup_dir = PathBuf::from(&self.config.backup_dir);
        if let Err(e) = std::fs::create_dir_all(&backup_dir) {
            return ProbeOutcome::failing(
                format!("cannot create backup directory: {e}"),
                None,
            );
        }
        let probe_file = backup_dir.join(".diag_write_test");
        if let Err(e) = std::fs::write(&probe_file, b"ok") {
            return ProbeOutcome::failing(
                format!("backup directory is not writable: {e}"),
                None,
            );
        }
        let _ = std::fs::remove_file(&probe_file);

        let ledger_path = backup_dir.join("ledger.jsonl");
        if !ledger_path.exists() {
            return ProbeOutcome::degraded("no ledger yet; it is created on the first backup");
        }
        match Ledger::open(&ledger_path) {
            Ok((_, records)) => ProbeOutcome::healthy(format!(
                "ledger intact ({} record(s))",
                records.len()
            )),
            Err(e) => {
                ProbeOutcome::failing(e.to_string(), Some("ledger_corrupt".to_string()))
            }
        }
    }

    async fn probe_environment(&self) -> ProbeOutcome {
        match self.config.validate() {
            Ok(()) => ProbeOutcome::healthy("configuration valid"),
            Err(e) => ProbeOutcome::failing(
                format!("{} configuration violation(s)", e.violations.len()),
                Some("invalid_configuration".to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowvault_client::ClientError;
    use flowvault_core::dto::workflow::WorkflowSummary;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeSource {
        hang: AtomicBool,
        fail_auth: AtomicBool,
    }

    #[async_trait]
    impl WorkflowSource for FakeSource {
        async fn fetch_workflow(&self, _id: &str) -> flowvault_client::Result<Value> {
            Ok(Value::Null)
        }

        async fn push_workflow(&self, _id: &str, _payload: &Value) -> flowvault_client::Result<()> {
            Ok(())
        }

        async fn list_workflows(
            &self,
            _limit: usize,
        ) -> flowvault_client::Result<Vec<WorkflowSummary>> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_auth.load(Ordering::SeqCst) {
                return Err(ClientError::RemoteAuthFailed {
                    status: 401,
                    message: "bad key".to_string(),
                });
            }
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeVcs;

    #[async_trait]
    impl VcsBackend for FakeVcs {
        async fn read_file(&self, _path: &str) -> flowvault_client::Result<Option<String>> {
            Ok(None)
        }

        async fn commit_file(
            &self,
            _path: &str,
            _content: &str,
            _message: &str,
        ) -> flowvault_client::Result<String> {
            Ok("commit-1".to_string())
        }
    }

    fn test_config(backup_dir: &std::path::Path) -> Arc<Config> {
        Arc::new(Config {
            remote_base_url: "http://localhost:5678".to_string(),
            remote_api_key: "key".to_string(),
            remote_api_key_header: "X-API-KEY".to_string(),
            remote_workflow_id: "wf-1".to_string(),
            vcs_repo_url: "https://github.com/acme/backups".to_string(),
            vcs_token: "token".to_string(),
            vcs_branch: "main".to_string(),
            retry_max_attempts: 3,
            retry_base_delay_ms: 1,
            log_level: "info".to_string(),
            backup_retention_count: 30,
            backup_dir: backup_dir.display().to_string(),
        })
    }

    fn engine(config: Arc<Config>, source: Arc<FakeSource>) -> DiagnosticsEngine {
        DiagnosticsEngine::new(
            config,
            source,
            Arc::new(FakeVcs),
            RemediationCatalog::builtin(),
        )
        .with_probe_timeout(Duration::from_millis(100))
    }

    fn probe<'a>(report: &'a DiagnosticReport, name: &str) -> &'a ProbeResult {
        report
            .probes
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("no probe named {name}"))
    }

    #[tokio::test]
    async fn test_all_probes_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let report = engine(test_config(dir.path()), Arc::new(FakeSource::default()))
            .status_system()
            .await;

        // local_state is degraded until the first backup writes a ledger.
        assert_eq!(probe(&report, "remote_api").status, ProbeStatus::Healthy);
        assert_eq!(probe(&report, "vcs_repository").status, ProbeStatus::Healthy);
        assert_eq!(probe(&report, "environment").status, ProbeStatus::Healthy);
        assert_eq!(probe(&report, "local_state").status, ProbeStatus::Degraded);
        assert_eq!(report.overall(), ProbeStatus::Degraded);
    }

    #[tokio::test]
    async fn test_hung_probe_times_out_without_hurting_others() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::default());
        source.hang.store(true, Ordering::SeqCst);
        let report = engine(test_config(dir.path()), source).status_system().await;

        let remote = probe(&report, "remote_api");
        assert_eq!(remote.status, ProbeStatus::Failing);
        assert_eq!(remote.message, "probe timeout");
        // The others still ran and report real results.
        assert_eq!(probe(&report, "vcs_repository").status, ProbeStatus::Healthy);
        assert_eq!(probe(&report, "environment").status, ProbeStatus::Healthy);
        assert_eq!(report.overall(), ProbeStatus::Failing);
    }

    #[tokio::test]
    async fn test_auth_failure_carries_remediation_hint() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::default());
        source.fail_auth.store(true, Ordering::SeqCst);
        let report = engine(test_config(dir.path()), source).status_system().await;

        let remote = probe(&report, "remote_api");
        assert_eq!(remote.status, ProbeStatus::Failing);
        let hint = remote.remediation.as_deref().unwrap();
        assert!(hint.contains("API key"));
    }

    #[tokio::test]
    async fn test_corrupt_ledger_reported_by_local_probe() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ledger.jsonl"), "not json\n").unwrap();
        let report = engine(test_config(dir.path()), Arc::new(FakeSource::default()))
            .status_system()
            .await;

        let local = probe(&report, "local_state");
        assert_eq!(local.status, ProbeStatus::Failing);
        assert!(local.remediation.is_some());
    }

    #[tokio::test]
    async fn test_invalid_environment_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = (*test_config(dir.path())).clone();
        config.remote_api_key = String::new();
        let report = engine(Arc::new(config), Arc::new(FakeSource::default()))
            .status_system()
            .await;

        let environment = probe(&report, "environment");
        assert_eq!(environment.status, ProbeStatus::Failing);
        assert!(environment.message.contains("1 configuration violation"));
    }
}

//! Backup orchestrator
//!
//! Coordinates export → validate → (unchanged | commit) → record for one
//! workflow at a time. The orchestrator owns the decision of when a new
//! snapshot or ledger record is created, enforces at-most-one in-flight
//! backup per workflow id, and honors a caller-supplied cancellation
//! token at every I/O suspension point.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use semver::Version;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use flowvault_client::{ClientError, VcsBackend, WorkflowSource};
use flowvault_core::config::Config;
use flowvault_core::domain::backup::{BackupOutcome, BackupPhase, BackupRecord};
use flowvault_core::domain::snapshot::{BumpLevel, WorkflowSnapshot};

use crate::store::{BackupPlan, SnapshotStore, StoreError};

/// Options for one backup invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupOptions {
    /// Export and validate only; nothing is committed or recorded
    pub dry_run: bool,
    /// Commit a new version even when content is unchanged
    pub force: bool,
    pub bump: BumpLevel,
}

/// Underlying cause of a failed backup attempt.
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FailureCause {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Client(e) => e.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

/// Errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Concurrency guard rejection. Not retried here; callers are
    /// expected to retry later.
    #[error("backup already in progress for workflow {0}")]
    InProgress(String),

    /// Caller-initiated cancellation. Recorded in the ledger but not an
    /// operational failure.
    #[error("backup of workflow {workflow_id} cancelled during {phase}")]
    Cancelled {
        workflow_id: String,
        phase: BackupPhase,
    },

    /// A backup step failed; carries the workflow id, the state-machine
    /// phase, and the version being attempted when one had been decided.
    #[error(
        "backup of workflow {} failed during {} (attempted version {}): {}",
        .workflow_id,
        .phase,
        .attempted_version.as_ref().map(Version::to_string).unwrap_or_else(|| "none".to_string()),
        .source
    )]
    Failed {
        workflow_id: String,
        phase: BackupPhase,
        attempted_version: Option<Version>,
        #[source]
        source: FailureCause,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BackupError {
    /// Machine-readable error kind, used for remediation lookup.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InProgress(_) => "backup_in_progress",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { source, .. } => source.kind(),
            Self::Store(e) => e.kind(),
        }
    }
}

/// Releases the per-workflow exclusion token when dropped.
struct FlightGuard<'a> {
    in_flight: &'a StdMutex<HashSet<String>>,
    workflow_id: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.workflow_id);
    }
}

/// Drives the backup state machine:
/// `Idle → Exporting → Validating → (Unchanged | Committing) → Recording → Idle`,
/// with failures from any active state recorded before surfacing.
pub struct BackupOrchestrator {
    config: Arc<Config>,
    source: Arc<dyn WorkflowSource>,
    vcs: Arc<dyn VcsBackend>,
    store: Mutex<SnapshotStore>,
    /// Arena of per-workflow exclusion tokens. An id present here has a
    /// backup in flight; distinct ids proceed in parallel.
    in_flight: StdMutex<HashSet<String>>,
}

impl BackupOrchestrator {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn WorkflowSource>,
        vcs: Arc<dyn VcsBackend>,
        store: SnapshotStore,
    ) -> Self {
        Self {
            config,
            source,
            vcs,
            store: Mutex::new(store),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    /// Run one backup of the configured workflow.
    ///
    /// Fails fast with [`BackupError::InProgress`] when a backup for the
    /// same workflow id is already running; never queues.
    pub async fn backup_now(
        &self,
        opts: BackupOptions,
        cancel: &CancellationToken,
    ) -> Result<BackupRecord, BackupError> {
        let workflow_id = self.config.remote_workflow_id.clone();
        let Some(_guard) = self.try_acquire(&workflow_id) else {
            return Err(BackupError::InProgress(workflow_id));
        };
        info!(
            %workflow_id,
            dry_run = opts.dry_run,
            force = opts.force,
            "starting backup"
        );
        self.run_backup(&workflow_id, opts, cancel).await
    }

    /// Restore a prior version: push its payload back to the remote and
    /// record a NEW forward snapshot whose content equals the restored
    /// one, keeping versions non-decreasing.
    pub async fn restore(
        &self,
        version: &Version,
        cancel: &CancellationToken,
    ) -> Result<BackupRecord, BackupError> {
        let workflow_id = self.config.remote_workflow_id.clone();
        let Some(_guard) = self.try_acquire(&workflow_id) else {
            return Err(BackupError::InProgress(workflow_id));
        };

        let snapshot = self.store.lock().await.load_snapshot(&workflow_id, version)?;
        info!(%workflow_id, %version, "restoring workflow from snapshot");

        let pushed = tokio::select! {
            _ = cancel.cancelled() => None,
            res = self.source.push_workflow(&workflow_id, &snapshot.payload) => Some(res),
        };
        match pushed {
            None => return self.cancel_out(&workflow_id, BackupPhase::Exporting, false).await,
            Some(Err(e)) => {
                return self
                    .fail_out(&workflow_id, BackupPhase::Exporting, None, e.into(), false)
                    .await;
            }
            Some(Ok(())) => {}
        }

        // Force a fresh forward version; the restored content hash may
        // match an earlier snapshot by construction.
        let plan_result = {
            let store = self.store.lock().await;
            store.plan_backup(&workflow_id, &snapshot.payload, BumpLevel::Patch, true)
        };
        let plan = match plan_result {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .fail_out(&workflow_id, BackupPhase::Validating, None, e.into(), false)
                    .await;
            }
        };

        self.commit_and_record(&workflow_id, snapshot.payload, plan, cancel)
            .await
    }

    /// All ledger records, oldest first.
    pub async fn backup_list(&self) -> Vec<BackupRecord> {
        self.store.lock().await.records().to_vec()
    }

    /// Load one committed snapshot of the configured workflow.
    pub async fn backup_show(&self, version: &Version) -> Result<WorkflowSnapshot, BackupError> {
        let workflow_id = &self.config.remote_workflow_id;
        Ok(self.store.lock().await.load_snapshot(workflow_id, version)?)
    }

    fn try_acquire(&self, workflow_id: &str) -> Option<FlightGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if in_flight.insert(workflow_id.to_string()) {
            Some(FlightGuard {
                in_flight: &self.in_flight,
                workflow_id: workflow_id.to_string(),
            })
        } else {
            None
        }
    }

    async fn run_backup(
        &self,
        workflow_id: &str,
        opts: BackupOptions,
        cancel: &CancellationToken,
    ) -> Result<BackupRecord, BackupError> {
        // Exporting
        let fetched = tokio::select! {
            _ = cancel.cancelled() => None,
            res = self.source.fetch_workflow(workflow_id) => Some(res),
        };
        let payload = match fetched {
            None => {
                return self
                    .cancel_out(workflow_id, BackupPhase::Exporting, opts.dry_run)
                    .await;
            }
            Some(Err(e)) => {
                return self
                    .fail_out(workflow_id, BackupPhase::Exporting, None, e.into(), opts.dry_run)
                    .await;
            }
            Some(Ok(payload)) => payload,
        };

        // Validating
        let plan_result = {
            let store = self.store.lock().await;
            store.plan_backup(workflow_id, &payload, opts.bump, opts.force)
        };
        let plan = match plan_result {
            Ok(plan) => plan,
            Err(e) => {
                return self
                    .fail_out(
                        workflow_id,
                        BackupPhase::Validating,
                        None,
                        e.into(),
                        opts.dry_run,
                    )
                    .await;
            }
        };

        if opts.dry_run {
            // Report what would change; nothing is committed or recorded.
            let outcome = if plan.unchanged {
                BackupOutcome::Unchanged {
                    version: plan.version,
                    content_hash: plan.content_hash,
                }
            } else {
                BackupOutcome::Succeeded {
                    version: plan.version,
                    content_hash: plan.content_hash,
                    commit_ref: None,
                }
            };
            info!(workflow_id, "dry run complete");
            return Ok(BackupRecord::new(workflow_id, outcome, true));
        }

        if plan.unchanged {
            // Skip Committing entirely; Recording still happens so the
            // ledger has a complete history of attempts.
            let record = BackupRecord::new(
                workflow_id,
                BackupOutcome::Unchanged {
                    version: plan.version.clone(),
                    content_hash: plan.content_hash,
                },
                false,
            );
            self.store.lock().await.record(record.clone())?;
            info!(workflow_id, version = %plan.version, "upstream unchanged, skipped commit");
            return Ok(record);
        }

        self.commit_and_record(workflow_id, payload, plan, cancel)
            .await
    }

    /// Committing → Recording tail, shared by backup and restore.
    async fn commit_and_record(
        &self,
        workflow_id: &str,
        payload: Value,
        plan: BackupPlan,
        cancel: &CancellationToken,
    ) -> Result<BackupRecord, BackupError> {
        let file_path = format!("workflows/{workflow_id}.json");
        let message = format!("backup: workflow {workflow_id} v{}", plan.version);
        let content = serde_json::to_string_pretty(&payload).map_err(StoreError::from)?;

        let committed = tokio::select! {
            _ = cancel.cancelled() => None,
            res = self.vcs.commit_file(&file_path, &content, &message) => Some(res),
        };
        let commit_ref = match committed {
            None => {
                return self
                    .cancel_out(workflow_id, BackupPhase::Committing, false)
                    .await;
            }
            Some(Err(e)) => {
                return self
                    .fail_out(
                        workflow_id,
                        BackupPhase::Committing,
                        Some(plan.version.clone()),
                        e.into(),
                        false,
                    )
                    .await;
            }
            Some(Ok(sha)) => sha,
        };

        // Recording
        let snapshot = WorkflowSnapshot {
            workflow_id: workflow_id.to_string(),
            version: plan.version.clone(),
            payload,
            content_hash: plan.content_hash.clone(),
            created_at: chrono::Utc::now(),
            commit_ref: Some(commit_ref.clone()),
        };
        let record = BackupRecord::new(
            workflow_id,
            BackupOutcome::Succeeded {
                version: plan.version.clone(),
                content_hash: plan.content_hash,
                commit_ref: Some(commit_ref),
            },
            false,
        );
        {
            let mut store = self.store.lock().await;
            store.store_snapshot(&snapshot)?;
            store.record(record.clone())?;
        }
        info!(workflow_id, version = %plan.version, "backup committed and recorded");
        Ok(record)
    }

    /// Record a failed attempt (real runs only) and surface the error.
    async fn fail_out(
        &self,
        workflow_id: &str,
        phase: BackupPhase,
        attempted_version: Option<Version>,
        cause: FailureCause,
        dry_run: bool,
    ) -> Result<BackupRecord, BackupError> {
        warn!(workflow_id, %phase, err = %cause, "backup failed");
        if !dry_run {
            let record = BackupRecord::new(
                workflow_id,
                BackupOutcome::Failed {
                    phase,
                    error_kind: cause.kind().to_string(),
                    message: cause.to_string(),
                },
                false,
            );
            if let Err(e) = self.store.lock().await.record(record) {
                error!(workflow_id, err = %e, "could not record failed backup attempt");
            }
        }
        Err(BackupError::Failed {
            workflow_id: workflow_id.to_string(),
            phase,
            attempted_version,
            source: cause,
        })
    }

    /// Record a cancelled attempt (real runs only) and surface it.
    async fn cancel_out(
        &self,
        workflow_id: &str,
        phase: BackupPhase,
        dry_run: bool,
    ) -> Result<BackupRecord, BackupError> {
        warn!(workflow_id, %phase, "backup cancelled");
        if !dry_run {
            let record =
                BackupRecord::new(workflow_id, BackupOutcome::Cancelled { phase }, false);
            if let Err(e) = self.store.lock().await.record(record) {
                error!(workflow_id, err = %e, "could not record cancelled backup attempt");
            }
        }
        Err(BackupError::Cancelled {
            workflow_id: workflow_id.to_string(),
            phase,
        })
    }
}

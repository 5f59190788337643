//! Process configuration
//!
//! Loaded once per invocation from environment variables, validated
//! eagerly, and treated as immutable afterwards. Components receive the
//! configuration through their constructors; nothing reads the
//! environment after startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration failed validation.
///
/// Every violation is collected before this is returned, so one run
/// reports all problems rather than the first one found.
#[derive(Debug, Error)]
#[error("invalid configuration:\n{}", .violations.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n"))]
pub struct ConfigError {
    pub violations: Vec<String>,
}

/// Immutable process configuration.
///
/// Secrets (`remote_api_key`, `vcs_token`) must never appear in logs or
/// unmasked display output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the remote orchestration system
    pub remote_base_url: String,
    /// API key sent on every remote request
    pub remote_api_key: String,
    /// Name of the header carrying the API key. The remote system uses a
    /// custom header, not a bearer scheme; the exact name varies per
    /// deployment.
    pub remote_api_key_header: String,
    /// Workflow this process backs up
    pub remote_workflow_id: String,
    /// Version-control repository receiving snapshots,
    /// e.g. `https://github.com/acme/workflow-backups`
    pub vcs_repo_url: String,
    /// Token for the version-control backend
    pub vcs_token: String,
    pub vcs_branch: String,
    /// Total attempts per remote call, including the first
    pub retry_max_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub retry_base_delay_ms: u64,
    pub log_level: String,
    /// How many snapshot payload files to keep locally per workflow.
    /// The ledger itself is never pruned.
    pub backup_retention_count: usize,
    /// Directory holding the ledger and local snapshot payloads
    pub backup_dir: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Expected variables (see `config init` for a template):
    /// - FLOWVAULT_REMOTE_URL (default: http://localhost:5678)
    /// - FLOWVAULT_REMOTE_API_KEY (required)
    /// - FLOWVAULT_REMOTE_API_KEY_HEADER (default: X-API-KEY)
    /// - FLOWVAULT_WORKFLOW_ID (required)
    /// - FLOWVAULT_VCS_REPO_URL (required)
    /// - FLOWVAULT_VCS_TOKEN (required)
    /// - FLOWVAULT_VCS_BRANCH (default: main)
    /// - FLOWVAULT_RETRY_MAX_ATTEMPTS (default: 3)
    /// - FLOWVAULT_RETRY_BASE_DELAY_MS (default: 500)
    /// - FLOWVAULT_LOG_LEVEL (default: info)
    /// - FLOWVAULT_BACKUP_RETENTION_COUNT (default: 30)
    /// - FLOWVAULT_BACKUP_DIR (default: ./backups)
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_env_unvalidated();
        config.validate()?;
        Ok(config)
    }

    /// Read the environment without validating, for display and
    /// validation commands that must work on a broken setup.
    pub fn from_env_unvalidated() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let var_or = |name: &str, default: &str| match std::env::var(name) {
            Ok(v) if !v.is_empty() => v,
            _ => default.to_string(),
        };

        Self {
            remote_base_url: var_or("FLOWVAULT_REMOTE_URL", "http://localhost:5678"),
            remote_api_key: var("FLOWVAULT_REMOTE_API_KEY"),
            remote_api_key_header: var_or("FLOWVAULT_REMOTE_API_KEY_HEADER", "X-API-KEY"),
            remote_workflow_id: var("FLOWVAULT_WORKFLOW_ID"),
            vcs_repo_url: var("FLOWVAULT_VCS_REPO_URL"),
            vcs_token: var("FLOWVAULT_VCS_TOKEN"),
            vcs_branch: var_or("FLOWVAULT_VCS_BRANCH", "main"),
            retry_max_attempts: var_or("FLOWVAULT_RETRY_MAX_ATTEMPTS", "3")
                .parse()
                .unwrap_or(0),
            retry_base_delay_ms: var_or("FLOWVAULT_RETRY_BASE_DELAY_MS", "500")
                .parse()
                .unwrap_or(0),
            log_level: var_or("FLOWVAULT_LOG_LEVEL", "info"),
            backup_retention_count: var_or("FLOWVAULT_BACKUP_RETENTION_COUNT", "30")
                .parse()
                .unwrap_or(0),
            backup_dir: var_or("FLOWVAULT_BACKUP_DIR", "./backups"),
        }
    }

    /// Validates the configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.remote_api_key.is_empty() {
            violations.push("FLOWVAULT_REMOTE_API_KEY is not set".to_string());
        }
        if self.remote_api_key_header.is_empty() {
            violations.push("FLOWVAULT_REMOTE_API_KEY_HEADER cannot be empty".to_string());
        }
        if self.remote_workflow_id.is_empty() {
            violations.push("FLOWVAULT_WORKFLOW_ID is not set".to_string());
        }
        if !self.remote_base_url.starts_with("http://")
            && !self.remote_base_url.starts_with("https://")
        {
            violations.push(format!(
                "FLOWVAULT_REMOTE_URL must start with http:// or https:// (got '{}')",
                self.remote_base_url
            ));
        }
        if self.vcs_token.is_empty() {
            violations.push("FLOWVAULT_VCS_TOKEN is not set".to_string());
        }
        if self.vcs_repo_url.is_empty() {
            violations.push("FLOWVAULT_VCS_REPO_URL is not set".to_string());
        } else if self.vcs_repo_path().is_none() {
            violations.push(format!(
                "FLOWVAULT_VCS_REPO_URL must look like https://github.com/<owner>/<repo> (got '{}')",
                self.vcs_repo_url
            ));
        }
        if self.vcs_branch.is_empty() {
            violations.push("FLOWVAULT_VCS_BRANCH cannot be empty".to_string());
        }
        if self.retry_max_attempts == 0 {
            violations.push("FLOWVAULT_RETRY_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if self.retry_base_delay_ms == 0 {
            violations.push("FLOWVAULT_RETRY_BASE_DELAY_MS must be greater than 0".to_string());
        }
        if self.backup_retention_count == 0 {
            violations.push("FLOWVAULT_BACKUP_RETENTION_COUNT must be at least 1".to_string());
        }
        if self.backup_dir.is_empty() {
            violations.push("FLOWVAULT_BACKUP_DIR cannot be empty".to_string());
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations })
        }
    }

    /// Owner and repository name parsed from the VCS repo URL.
    ///
    /// Returns `None` when the URL is not a well-formed
    /// `https://github.com/<owner>/<repo>` URL; `validate` treats that as
    /// a violation, so a validated config always yields `Some`.
    pub fn vcs_repo_path(&self) -> Option<(&str, &str)> {
        let rest = self.vcs_repo_url.strip_prefix("https://github.com/")?;
        let rest = rest.trim_end_matches('/').trim_end_matches(".git");
        let (owner, repo) = rest.split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some((owner, repo))
    }

    /// Delay before the first retry.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Environment file template written by `config init`.
    pub fn env_template() -> &'static str {
        "\
# Flowvault configuration template
# Copy this file to .env (or export the variables) and fill in your values.

# Remote orchestration system
FLOWVAULT_REMOTE_URL=http://localhost:5678
FLOWVAULT_REMOTE_API_KEY=your_api_key_here
# Header name carrying the key; n8n instances use X-N8N-API-KEY
FLOWVAULT_REMOTE_API_KEY_HEADER=X-API-KEY
FLOWVAULT_WORKFLOW_ID=your_workflow_id

# Version-control backend
FLOWVAULT_VCS_REPO_URL=https://github.com/username/repository
FLOWVAULT_VCS_TOKEN=your_personal_access_token
FLOWVAULT_VCS_BRANCH=main

# Retry policy
FLOWVAULT_RETRY_MAX_ATTEMPTS=3
FLOWVAULT_RETRY_BASE_DELAY_MS=500

# Application settings
FLOWVAULT_LOG_LEVEL=info
FLOWVAULT_BACKUP_RETENTION_COUNT=30
FLOWVAULT_BACKUP_DIR=./backups
"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            remote_base_url: "http://localhost:5678".to_string(),
            remote_api_key: "key".to_string(),
            remote_api_key_header: "X-API-KEY".to_string(),
            remote_workflow_id: "wf-1".to_string(),
            vcs_repo_url: "https://github.com/acme/backups".to_string(),
            vcs_token: "token".to_string(),
            vcs_branch: "main".to_string(),
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            log_level: "info".to_string(),
            backup_retention_count: 30,
            backup_dir: "./backups".to_string(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_all_violations_reported_together() {
        let mut config = valid_config();
        config.remote_api_key = String::new();
        config.remote_workflow_id = String::new();
        config.vcs_token = String::new();
        config.retry_max_attempts = 0;

        let err = config.validate().unwrap_err();
        assert_eq!(err.violations.len(), 4);
        let rendered = err.to_string();
        assert!(rendered.contains("FLOWVAULT_REMOTE_API_KEY"));
        assert!(rendered.contains("FLOWVAULT_WORKFLOW_ID"));
        assert!(rendered.contains("FLOWVAULT_VCS_TOKEN"));
        assert!(rendered.contains("FLOWVAULT_RETRY_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_bad_remote_url_rejected() {
        let mut config = valid_config();
        config.remote_base_url = "localhost:5678".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.violations.len(), 1);
    }

    #[test]
    fn test_vcs_repo_path_parsing() {
        let mut config = valid_config();
        assert_eq!(config.vcs_repo_path(), Some(("acme", "backups")));

        config.vcs_repo_url = "https://github.com/acme/backups.git".to_string();
        assert_eq!(config.vcs_repo_path(), Some(("acme", "backups")));

        config.vcs_repo_url = "https://gitlab.com/acme/backups".to_string();
        assert_eq!(config.vcs_repo_path(), None);

        config.vcs_repo_url = "https://github.com/acme".to_string();
        assert_eq!(config.vcs_repo_path(), None);
    }

    #[test]
    fn test_env_template_covers_required_vars() {
        let template = Config::env_template();
        for var in [
            "FLOWVAULT_REMOTE_API_KEY",
            "FLOWVAULT_WORKFLOW_ID",
            "FLOWVAULT_VCS_REPO_URL",
            "FLOWVAULT_VCS_TOKEN",
        ] {
            assert!(template.contains(var), "template missing {var}");
        }
    }
}

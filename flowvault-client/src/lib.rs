//! Flowvault HTTP Clients
//!
//! Type-safe HTTP clients for the two external services the backup engine
//! talks to: the remote workflow orchestration API and the version-control
//! backend holding committed snapshots.
//!
//! Both clients wrap every call in the shared retry/backoff policy and
//! surface the error taxonomy the engine acts on (`RemoteUnavailable`,
//! `RemoteAuthFailed`, `ConcurrentModification`, ...). The engine depends
//! only on the [`WorkflowSource`] and [`VcsBackend`] traits, so tests can
//! substitute in-memory fakes.
//!
//! # Example
//!
//! ```no_run
//! use flowvault_client::{WorkflowClient, WorkflowSource};
//! use flowvault_core::config::Config;
//!
//! # async fn example(config: Config) -> flowvault_client::Result<()> {
//! let client = WorkflowClient::new(&config);
//! let payload = client.fetch_workflow(&config.remote_workflow_id).await?;
//! println!("exported {} bytes", payload.to_string().len());
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
mod remote;
mod vcs;

pub use backoff::{BackoffPolicy, retry_with_backoff};
pub use error::{ClientError, Result};
pub use remote::{WorkflowClient, WorkflowSource};
pub use vcs::{VcsBackend, VcsClient};

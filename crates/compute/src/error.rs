//! Lifecycle error taxonomy.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::providers::{LifecycleState, ProviderError};
use crate::vm::{JobId, VmId};

/// Exit status for configuration problems (missing credentials, bad poll
/// parameters).
pub const EXIT_CONFIG: u8 = 2;

/// Exit status for failures while driving the lifecycle.
pub const EXIT_RUNTIME: u8 = 1;

/// Errors surfaced by the lifecycle core.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Missing credentials or invalid run parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider rejected the creation request outright.
    #[error("Provisioning {name} failed: {source}")]
    Provision {
        name: String,
        #[source]
        source: ProviderError,
    },

    /// The polling budget ran out before a terminal status was seen.
    #[error(
        "{operation} timed out after {attempts} attempts every {}s{}",
        .interval.as_secs(),
        .last_error.as_deref().map(|e| format!(" (last error: {e})")).unwrap_or_default()
    )]
    Timeout {
        operation: String,
        attempts: u32,
        interval: Duration,
        last_error: Option<String>,
    },

    /// The provider reported that the asynchronous job failed.
    #[error("Job {job_id} failed: {detail}")]
    JobFailed { job_id: JobId, detail: String },

    /// The provider rejected start, halt or destroy for a reason other than
    /// the VM already being in the requested state.
    #[error("{operation} rejected for {vm_id}: {source}")]
    StateTransition {
        operation: &'static str,
        vm_id: VmId,
        #[source]
        source: ProviderError,
    },

    /// The VM moved somewhere the awaited state cannot be reached from.
    #[error("{vm_id} is {observed}, cannot become {expected}")]
    UnexpectedState {
        vm_id: VmId,
        expected: LifecycleState,
        observed: LifecycleState,
    },

    /// A state, address or job read failed. Retryable.
    #[error("Reading {what} for {target} failed: {source}")]
    TransientRead {
        what: &'static str,
        target: String,
        #[source]
        source: ProviderError,
    },

    /// A read failed in a way that retrying will not fix (unknown handle,
    /// malformed body, client error).
    #[error("Reading {what} for {target} failed permanently: {source}")]
    ReadFailed {
        what: &'static str,
        target: String,
        #[source]
        source: ProviderError,
    },

    /// The operation needs a resource identity the VM does not have yet.
    #[error("{name} has no resource identity yet, cannot {operation}")]
    Unprovisioned { name: String, operation: &'static str },

    /// The caller cancelled the run.
    #[error("{0} cancelled")]
    Cancelled(String),
}

impl LifecycleError {
    /// Wrap a failed provider read, keeping retryable failures apart from
    /// permanent ones.
    pub(crate) fn read(
        what: &'static str,
        target: impl fmt::Display,
        source: ProviderError,
    ) -> Self {
        let target = target.to_string();
        if source.is_transient() {
            Self::TransientRead {
                what,
                target,
                source,
            }
        } else {
            Self::ReadFailed {
                what,
                target,
                source,
            }
        }
    }

    /// Whether the error must stop forward progress of a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::TransientRead { .. })
    }

    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_CONFIG,
            _ => EXIT_RUNTIME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_includes_last_error() {
        let err = LifecycleError::Timeout {
            operation: "waiting for job job-1".into(),
            attempts: 3,
            interval: Duration::from_secs(5),
            last_error: Some("connection reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "waiting for job job-1 timed out after 3 attempts every 5s (last error: connection reset)"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let config = LifecycleError::Config("missing".into());
        let failed = LifecycleError::JobFailed {
            job_id: JobId::from("job-1"),
            detail: "quota".into(),
        };
        assert_eq!(config.exit_code(), EXIT_CONFIG);
        assert_eq!(failed.exit_code(), EXIT_RUNTIME);
        assert_ne!(EXIT_CONFIG, EXIT_RUNTIME);
    }

    #[test]
    fn test_transient_reads_are_not_terminal() {
        let err = LifecycleError::read(
            "state",
            "vm-42",
            ProviderError::Api {
                status: 503,
                message: "unavailable".into(),
            },
        );
        assert!(matches!(err, LifecycleError::TransientRead { .. }));
        assert!(!err.is_terminal());
        assert!(LifecycleError::Cancelled("run".into()).is_terminal());
    }

    #[test]
    fn test_permanent_read_failures_are_terminal() {
        let err = LifecycleError::read(
            "job status",
            "job-bogus",
            ProviderError::NotFound("job-bogus does not exist".into()),
        );
        assert!(matches!(
            err,
            LifecycleError::ReadFailed {
                what: "job status",
                ..
            }
        ));
        assert!(err.is_terminal());
        assert!(err.to_string().contains("job-bogus"));
    }
}

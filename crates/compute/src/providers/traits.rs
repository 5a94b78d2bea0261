//! Provider trait and common types for compute providers.

use std::collections::BTreeSet;
use std::net::IpAddr;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vm::{JobId, VmId, VmSpec};

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource is already in the state the request asked for.
    #[error("Already in requested state: {0}")]
    AlreadyInState(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Provider-reported VM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// VM is being created.
    Provisioning,
    /// VM is booting.
    Starting,
    /// VM is up.
    Running,
    /// VM is shutting down.
    Stopping,
    /// VM is off.
    Stopped,
    /// VM is being torn down.
    Destroying,
    /// VM is gone, or the provider no longer knows the identity.
    Destroyed,
    /// Unknown status.
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    /// Whether a VM in this state can still reach `target` on its own or
    /// through a start/halt request.
    #[must_use]
    pub fn can_reach(self, target: Self) -> bool {
        match target {
            Self::Destroyed => true,
            Self::Destroying => !matches!(self, Self::Destroyed),
            _ => !matches!(self, Self::Destroying | Self::Destroyed),
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provisioning => write!(f, "provisioning"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Destroying => write!(f, "destroying"),
            Self::Destroyed => write!(f, "destroyed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of querying an asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Still running.
    Pending,
    /// Completed; carries the created resource identity.
    Success(VmId),
    /// Completed with an error; carries the provider's detail.
    Failure(String),
}

/// Trait for compute providers.
///
/// Creation is asynchronous: [`provision`](Self::provision) returns a job
/// handle that must be resolved through [`query_job`](Self::query_job).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Submit a VM for creation. Must not wait for the VM to exist.
    async fn provision(&self, spec: &VmSpec) -> Result<JobId, ProviderError>;

    /// Query an asynchronous creation job.
    async fn query_job(&self, job_id: &JobId) -> Result<JobStatus, ProviderError>;

    /// Request a VM start.
    ///
    /// Implementations return [`ProviderError::AlreadyInState`] when the
    /// provider refuses because the VM is already running.
    async fn start(&self, id: &VmId) -> Result<(), ProviderError>;

    /// Request a VM halt.
    async fn halt(&self, id: &VmId) -> Result<(), ProviderError>;

    /// Request VM teardown.
    async fn destroy(&self, id: &VmId) -> Result<(), ProviderError>;

    /// Read the current VM state. An identity the provider no longer knows
    /// reads as [`LifecycleState::Destroyed`].
    async fn get_state(&self, id: &VmId) -> Result<LifecycleState, ProviderError>;

    /// Read the VM addresses. Empty while the VM has no network attached.
    async fn get_ips(&self, id: &VmId) -> Result<BTreeSet<IpAddr>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Api {
            status: 503,
            message: "maintenance".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 431,
            message: "bad param".into()
        }
        .is_transient());
        assert!(!ProviderError::NotFound("vm-1".into()).is_transient());
    }

    #[test]
    fn test_reachability() {
        use LifecycleState::{Destroyed, Destroying, Running, Starting, Stopped, Stopping};

        assert!(Stopping.can_reach(Running));
        assert!(Starting.can_reach(Stopped));
        assert!(!Destroying.can_reach(Running));
        assert!(!Destroyed.can_reach(Stopped));
        assert!(Running.can_reach(Destroyed));
        assert!(!Destroyed.can_reach(Destroying));
    }

    #[test]
    fn test_state_serde() {
        let state: LifecycleState = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(state, LifecycleState::Running);
        let state: LifecycleState = serde_json::from_str("\"migrating\"").unwrap();
        assert_eq!(state, LifecycleState::Unknown);
    }
}

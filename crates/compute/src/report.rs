//! Read-only VM snapshots taken between lifecycle steps.

use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::LifecycleError;
use crate::providers::{ComputeProvider, LifecycleState};
use crate::vm::VirtualMachine;

/// Reads name, state and addresses of one VM.
///
/// A VM that has no resource identity yet reads as
/// [`LifecycleState::Provisioning`] with no addresses, without asking the
/// provider.
pub struct StateReporter<'a, P: ?Sized> {
    provider: &'a P,
    vm: &'a VirtualMachine,
}

impl<'a, P> StateReporter<'a, P>
where
    P: ComputeProvider + ?Sized,
{
    #[must_use]
    pub fn new(provider: &'a P, vm: &'a VirtualMachine) -> Self {
        Self { provider, vm }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.vm.name()
    }

    /// # Errors
    /// Returns [`LifecycleError::TransientRead`] or
    /// [`LifecycleError::ReadFailed`] if the provider read fails.
    pub async fn state(&self) -> Result<LifecycleState, LifecycleError> {
        let Some(id) = self.vm.id() else {
            return Ok(LifecycleState::Provisioning);
        };
        self.provider
            .get_state(id)
            .await
            .map_err(|source| LifecycleError::read("state", id, source))
    }

    /// An empty set means "no addresses yet", not a failure.
    ///
    /// # Errors
    /// Returns [`LifecycleError::TransientRead`] or
    /// [`LifecycleError::ReadFailed`] if the provider read fails.
    pub async fn ips(&self) -> Result<BTreeSet<IpAddr>, LifecycleError> {
        let Some(id) = self.vm.id() else {
            return Ok(BTreeSet::new());
        };
        self.provider
            .get_ips(id)
            .await
            .map_err(|source| LifecycleError::read("addresses", id, source))
    }

    /// Take all three readings. Read failures are kept in the snapshot and
    /// logged, never raised.
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state().await;
        if let Err(e) = &state {
            warn!(vm = %self.name(), error = %e, "Failed to read state");
        }
        let ips = self.ips().await;
        if let Err(e) = &ips {
            warn!(vm = %self.name(), error = %e, "Failed to read addresses");
        }

        Snapshot {
            name: self.name().to_string(),
            state,
            ips,
            taken_at: Utc::now(),
        }
    }
}

/// Point-in-time view of a VM.
#[derive(Debug)]
pub struct Snapshot {
    pub name: String,
    pub state: Result<LifecycleState, LifecycleError>,
    pub ips: Result<BTreeSet<IpAddr>, LifecycleError>,
    pub taken_at: DateTime<Utc>,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tName: {}", self.name)?;
        match &self.state {
            Ok(state) => writeln!(f, "\tState: {state}")?,
            Err(e) => writeln!(f, "\tState: <unavailable: {e}>")?,
        }
        match &self.ips {
            Ok(ips) => {
                let ips: Vec<String> = ips.iter().map(ToString::to_string).collect();
                write!(f, "\tIPs: [{}]", ips.join(", "))
            }
            Err(e) => write!(f, "\tIPs: <unavailable: {e}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockComputeProvider, ProviderError};
    use crate::vm::{test_spec, VmId};

    fn created_vm() -> VirtualMachine {
        let mut vm = VirtualMachine::new(test_spec());
        vm.record_identity(VmId::from("vm-42"));
        vm
    }

    #[tokio::test]
    async fn test_unprovisioned_vm_reads_locally() {
        let mut provider = MockComputeProvider::new();
        provider.expect_get_state().times(0);
        provider.expect_get_ips().times(0);

        let vm = VirtualMachine::new(test_spec());
        let snapshot = StateReporter::new(&provider, &vm).snapshot().await;

        assert_eq!(snapshot.name, "lifecycle-test");
        assert_eq!(snapshot.state.unwrap(), LifecycleState::Provisioning);
        assert!(snapshot.ips.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ips_while_starting_is_not_an_error() {
        let mut provider = MockComputeProvider::new();
        provider
            .expect_get_state()
            .returning(|_| Ok(LifecycleState::Starting));
        provider.expect_get_ips().returning(|_| Ok(BTreeSet::new()));

        let vm = created_vm();
        let reporter = StateReporter::new(&provider, &vm);

        assert_eq!(reporter.state().await.unwrap(), LifecycleState::Starting);
        assert!(reporter.ips().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_failures_are_kept_in_snapshot() {
        let mut provider = MockComputeProvider::new();
        provider.expect_get_state().returning(|_| {
            Err(ProviderError::Api {
                status: 503,
                message: "unavailable".into(),
            })
        });
        provider
            .expect_get_ips()
            .returning(|_| Ok(BTreeSet::from(["185.19.28.10".parse().unwrap()])));

        let vm = created_vm();
        let snapshot = StateReporter::new(&provider, &vm).snapshot().await;

        assert!(matches!(
            snapshot.state,
            Err(LifecycleError::TransientRead { what: "state", .. })
        ));
        assert_eq!(snapshot.ips.as_ref().unwrap().len(), 1);

        let rendered = snapshot.to_string();
        assert!(rendered.contains("\tName: lifecycle-test"));
        assert!(rendered.contains("<unavailable:"));
        assert!(rendered.contains("[185.19.28.10]"));
    }
}

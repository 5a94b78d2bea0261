//! The VM entity: what we asked the provider for and what it gave us back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Opaque token returned by an asynchronous creation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

/// Opaque token the provider assigns once the VM physically exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmId(String);

macro_rules! opaque_id {
    ($ty:ident) => {
        impl $ty {
            /// Borrow the raw token.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(JobId);
opaque_id!(VmId);

/// OS image to boot from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Template display name (e.g., "Linux Ubuntu 16.04 LTS 64-bit").
    pub name: String,
    /// Root disk size in GB.
    pub storage_gb: u32,
    /// Zone the template is published in.
    pub zone: String,
}

/// Desired configuration of a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    /// Human-readable name, chosen by the caller.
    pub name: String,
    /// OS image.
    pub template: Template,
    /// Compute size class (e.g., "Micro").
    pub offering: String,
    /// Security group names.
    pub security_groups: Vec<String>,
    /// SSH keypair name.
    pub keypair: Option<String>,
    /// Boot-time user-data (cloud-init).
    pub user_data: Option<String>,
    /// Zone to deploy in.
    pub zone: String,
}

impl VmSpec {
    /// Check the spec before it is submitted.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Config`] if a required field is empty.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        let required = [
            ("name", &self.name),
            ("template.name", &self.template.name),
            ("template.zone", &self.template.zone),
            ("offering", &self.offering),
            ("zone", &self.zone),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(LifecycleError::Config(format!("VM spec field `{field}` is empty")));
        }
        if self.template.storage_gb == 0 {
            return Err(LifecycleError::Config(
                "VM spec field `template.storage_gb` must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Where the entity is in its local lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has been submitted yet.
    Draft,
    /// Creation was submitted; waiting on the job.
    Provisioning,
    /// The provider resolved the job to a resource identity.
    Created,
    /// Teardown was accepted; the identity no longer resolves.
    Destroyed,
}

/// A single VM driven through one lifecycle run.
///
/// The spec is fixed at construction and only handed out by shared
/// reference, so it cannot change once Provision has been called.
#[derive(Debug)]
pub struct VirtualMachine {
    spec: VmSpec,
    job_id: Option<JobId>,
    id: Option<VmId>,
    destroyed: bool,
}

impl VirtualMachine {
    /// Create an entity from a desired configuration.
    #[must_use]
    pub fn new(spec: VmSpec) -> Self {
        Self {
            spec,
            job_id: None,
            id: None,
            destroyed: false,
        }
    }

    /// The caller-chosen name. Never requires a provider call.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn spec(&self) -> &VmSpec {
        &self.spec
    }

    /// Job handle from Provision, kept afterwards for auditing.
    #[must_use]
    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    /// Resource identity, set once creation completed.
    #[must_use]
    pub fn id(&self) -> Option<&VmId> {
        self.id.as_ref()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        match (&self.job_id, &self.id, self.destroyed) {
            (_, _, true) => Phase::Destroyed,
            (_, Some(_), false) => Phase::Created,
            (Some(_), None, false) => Phase::Provisioning,
            (None, None, false) => Phase::Draft,
        }
    }

    /// Resource identity, or an error naming the operation that needed it.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Unprovisioned`] before creation completed
    /// and [`LifecycleError::Config`] after the VM was destroyed.
    pub fn require_id(&self, operation: &'static str) -> Result<&VmId, LifecycleError> {
        if self.destroyed {
            return Err(LifecycleError::Config(format!(
                "{} was already destroyed; refusing to {operation}",
                self.spec.name
            )));
        }
        self.id.as_ref().ok_or_else(|| LifecycleError::Unprovisioned {
            name: self.spec.name.clone(),
            operation,
        })
    }

    pub(crate) fn record_job(&mut self, job_id: JobId) -> Result<(), LifecycleError> {
        if let Some(existing) = &self.job_id {
            return Err(LifecycleError::Config(format!(
                "{} was already provisioned (job {existing})",
                self.spec.name
            )));
        }
        self.job_id = Some(job_id);
        Ok(())
    }

    pub(crate) fn record_identity(&mut self, id: VmId) {
        self.id = Some(id);
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }
}

#[cfg(test)]
pub(crate) fn test_spec() -> VmSpec {
    VmSpec {
        name: "lifecycle-test".into(),
        template: Template {
            name: "Linux Ubuntu 16.04 LTS 64-bit".into(),
            storage_gb: 10,
            zone: "ch-dk-2".into(),
        },
        offering: "Micro".into(),
        security_groups: vec!["default".into()],
        keypair: Some("first".into()),
        user_data: Some("#cloud-config\n".into()),
        zone: "ch-dk-2".into(),
    }
}

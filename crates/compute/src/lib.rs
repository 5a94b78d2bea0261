//! Virtual machine lifecycle runner.
//!
//! This crate provisions a VM through an asynchronous, eventually-consistent
//! compute API and drives it through create, start, halt and destroy. The
//! provider only hands back a job handle on creation; [`poll`] turns that
//! into a resource identity within a bounded budget, and [`lifecycle`] keeps
//! start/halt/destroy safe to repeat while the provider catches up.
//!
//! # Example
//!
//! ```rust,ignore
//! use compute::config::{Credentials, RunConfig};
//! use compute::providers::exoscale::Exoscale;
//! use compute::{Orchestrator, VirtualMachine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let run = RunConfig::default();
//!     let credentials = Credentials::from_parts(Some(key), Some(secret))?;
//!     let provider = Exoscale::new(&run.endpoint, credentials)?;
//!
//!     let orchestrator = Orchestrator::new(provider, run.lifecycle_config()?);
//!     let mut vm = VirtualMachine::new(run.vm_spec());
//!
//!     let report = orchestrator.run(&mut vm, |obs| println!("{obs}")).await?;
//!     println!("done with {}", report.vm_id);
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod poll;
pub mod providers;
pub mod report;
pub mod vm;

pub use error::LifecycleError;
pub use lifecycle::{LifecycleConfig, Observation, Orchestrator, RunReport, Step};
pub use poll::PollPolicy;
pub use providers::{ComputeProvider, JobStatus, LifecycleState, ProviderError};
pub use report::{Snapshot, StateReporter};
pub use vm::{JobId, Phase, Template, VirtualMachine, VmId, VmSpec};

//! Provider abstractions for compute providers.

pub mod exoscale;
mod traits;

#[cfg(test)]
pub use traits::MockComputeProvider;
pub use traits::{ComputeProvider, JobStatus, LifecycleState, ProviderError};

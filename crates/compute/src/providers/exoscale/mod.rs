//! Exoscale compute provider.
//!
//! Implements the [`ComputeProvider`](crate::providers::ComputeProvider)
//! trait for the CloudStack-style Exoscale compute API.
//!
//! ## Overview
//!
//! Every call is a signed `GET` with a `command` parameter. VM creation,
//! start, stop and destroy are asynchronous: the API answers with a job ID
//! and the outcome is read through `queryAsyncJobResult`.

mod client;
mod models;

pub use client::Exoscale;
pub use models::*;

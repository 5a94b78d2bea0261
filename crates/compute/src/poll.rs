//! Bounded polling of asynchronous provider work.
//!
//! Every wait in a lifecycle run goes through [`poll_until`]: at most
//! `max_attempts` probes, `interval` apart, so the worst-case wait is
//! `max_attempts * interval` and never open-ended. A probe that fails with a
//! transient read error consumes an attempt but does not end the loop; a
//! permanent read error, a terminal answer or the exhausted budget does.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LifecycleError;
use crate::providers::{ComputeProvider, JobStatus, LifecycleState};
use crate::vm::{JobId, VmId};

/// Attempt budget for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Number of probes before giving up.
    pub max_attempts: u32,
    /// Delay between two probes.
    pub interval: Duration,
}

impl PollPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Reject budgets that could never observe anything.
    ///
    /// # Errors
    /// Returns [`LifecycleError::Config`] when `max_attempts` is zero.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.max_attempts == 0 {
            return Err(LifecycleError::Config(
                "poll max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

}

/// Outcome of a single probe.
#[derive(Debug)]
pub enum Probe<T> {
    /// Done; stop polling with this value.
    Ready(T),
    /// Not yet; poll again if budget remains.
    Pending,
    /// Terminal failure; stop polling with this error.
    Failed(LifecycleError),
}

/// Probe until ready, failed, cancelled or out of attempts.
///
/// No sleep happens before the first probe or after the last one. The
/// cancellation token is checked before every probe and raced against every
/// sleep.
///
/// # Errors
/// - [`LifecycleError::Config`] if the policy is invalid (no probe is made)
/// - [`LifecycleError::Timeout`] once all attempts came back pending or with
///   transient read errors
/// - [`LifecycleError::Cancelled`] if `cancel` fires
/// - whatever a probe returns through [`Probe::Failed`], or any terminal
///   error it returns directly
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut probe: F,
) -> Result<T, LifecycleError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe<T>, LifecycleError>>,
{
    policy.validate()?;

    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(LifecycleError::Cancelled(operation.to_string()));
        }

        match probe(attempt).await {
            Ok(Probe::Ready(value)) => {
                debug!(operation, attempt, "Poll finished");
                return Ok(value);
            }
            Ok(Probe::Failed(err)) => return Err(err),
            Ok(Probe::Pending) => {
                debug!(operation, attempt, max_attempts = policy.max_attempts, "Still pending");
            }
            Err(err) if err.is_terminal() => {
                warn!(operation, attempt, error = %err, "Poll read failed permanently");
                return Err(err);
            }
            Err(err) => {
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "Poll read failed, counting attempt"
                );
                last_error = Some(err.to_string());
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(LifecycleError::Cancelled(operation.to_string()));
                }
                () = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    Err(LifecycleError::Timeout {
        operation: operation.to_string(),
        attempts: policy.max_attempts,
        interval: policy.interval,
        last_error,
    })
}

/// Resolve a creation job handle to the identity of the created VM.
///
/// # Errors
/// [`LifecycleError::JobFailed`] as soon as the provider reports failure,
/// otherwise the errors of [`poll_until`].
pub async fn wait_for_creation<P>(
    provider: &P,
    job_id: &JobId,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<VmId, LifecycleError>
where
    P: ComputeProvider + ?Sized,
{
    info!(
        job_id = %job_id,
        max_attempts = policy.max_attempts,
        interval_secs = policy.interval.as_secs(),
        "Waiting for VM creation"
    );

    let operation = format!("waiting for job {job_id}");
    let id = poll_until(policy, cancel, &operation, move |_| async move {
        let status = provider
            .query_job(job_id)
            .await
            .map_err(|source| LifecycleError::read("job status", job_id, source))?;
        Ok(match status {
            JobStatus::Pending => Probe::Pending,
            JobStatus::Success(id) => Probe::Ready(id),
            JobStatus::Failure(detail) => Probe::Failed(LifecycleError::JobFailed {
                job_id: job_id.clone(),
                detail,
            }),
        })
    })
    .await?;

    info!(job_id = %job_id, vm_id = %id, "VM created");
    Ok(id)
}

/// Poll the VM state until it reads `target`.
///
/// # Errors
/// [`LifecycleError::UnexpectedState`] as soon as the VM reads a state from
/// which `target` is unreachable, otherwise the errors of [`poll_until`].
pub async fn wait_for_state<P>(
    provider: &P,
    id: &VmId,
    target: LifecycleState,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<LifecycleState, LifecycleError>
where
    P: ComputeProvider + ?Sized,
{
    debug!(vm_id = %id, target = %target, "Waiting for state");

    let operation = format!("waiting for {id} to become {target}");
    poll_until(policy, cancel, &operation, move |_| async move {
        let observed = provider
            .get_state(id)
            .await
            .map_err(|source| LifecycleError::read("state", id, source))?;
        Ok(if observed == target {
            Probe::Ready(observed)
        } else if observed.can_reach(target) {
            Probe::Pending
        } else {
            Probe::Failed(LifecycleError::UnexpectedState {
                vm_id: id.clone(),
                expected: target,
                observed,
            })
        })
    })
    .await
}

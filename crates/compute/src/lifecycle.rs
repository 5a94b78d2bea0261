//! Lifecycle orchestration for a single VM.
//!
//! The orchestrator never trusts its own idea of the VM state: the provider
//! is eventually consistent, so a start issued a moment ago may still be in
//! flight. Start, halt and destroy therefore succeed without error when the
//! VM is already where the request would take it, and every transition in a
//! run is confirmed by polling the state rather than by sleeping.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::poll::{self, PollPolicy};
use crate::providers::{ComputeProvider, LifecycleState, ProviderError};
use crate::report::{Snapshot, StateReporter};
use crate::vm::{JobId, Phase, VirtualMachine, VmId};

/// Default creation budget: 60 polls, 5 seconds apart.
pub const DEFAULT_CREATION_POLL: PollPolicy = PollPolicy {
    max_attempts: 60,
    interval: Duration::from_secs(5),
};

/// Default budget for start/halt/destroy to settle.
pub const DEFAULT_TRANSITION_POLL: PollPolicy = PollPolicy {
    max_attempts: 36,
    interval: Duration::from_secs(5),
};

/// Timing knobs for a run.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Budget for resolving the creation job.
    pub creation_poll: PollPolicy,
    /// Budget for each start/halt/destroy to be observed.
    pub transition_poll: PollPolicy,
    /// Extra wait after creation before the first observation.
    pub post_create_settle: Duration,
    /// Extra wait after a confirmed start.
    pub post_start_settle: Duration,
    /// Extra wait after a confirmed halt.
    pub post_halt_settle: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            creation_poll: DEFAULT_CREATION_POLL,
            transition_poll: DEFAULT_TRANSITION_POLL,
            post_create_settle: Duration::ZERO,
            post_start_settle: Duration::ZERO,
            post_halt_settle: Duration::ZERO,
        }
    }
}

impl LifecycleConfig {
    /// # Errors
    /// Returns [`LifecycleError::Config`] if either poll budget is empty.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        self.creation_poll.validate()?;
        self.transition_poll.validate()
    }
}

/// Steps of a lifecycle run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Provision,
    WaitForCreation,
    Start,
    Halt,
    Restart,
    Destroy,
}

impl Step {
    /// State the VM should read after this step.
    #[must_use]
    pub fn expected_state(self) -> LifecycleState {
        match self {
            Self::Provision => LifecycleState::Provisioning,
            Self::WaitForCreation | Self::Start | Self::Restart => LifecycleState::Running,
            Self::Halt => LifecycleState::Stopped,
            Self::Destroy => LifecycleState::Destroyed,
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::WaitForCreation => "wait for creation",
            Self::Start => "start",
            Self::Halt => "halt",
            Self::Restart => "restart",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Snapshot taken right after a step completed.
#[derive(Debug)]
pub struct Observation {
    pub step: Step,
    pub snapshot: Snapshot,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[after {}: machine should be {}]",
            self.step,
            self.step.expected_state()
        )?;
        write!(f, "{}", self.snapshot)
    }
}

/// Outcome of a complete run.
#[derive(Debug)]
pub struct RunReport {
    pub job_id: JobId,
    pub vm_id: VmId,
    pub observations: Vec<Observation>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one VM through provision, start, halt and destroy.
pub struct Orchestrator<P> {
    provider: P,
    config: LifecycleConfig,
    cancel: CancellationToken,
}

impl<P: ComputeProvider> Orchestrator<P> {
    #[must_use]
    pub fn new(provider: P, config: LifecycleConfig) -> Self {
        Self {
            provider,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort polls and settle waits when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reporter bound to this orchestrator's provider.
    #[must_use]
    pub fn reporter<'a>(&'a self, vm: &'a VirtualMachine) -> StateReporter<'a, P> {
        StateReporter::new(&self.provider, vm)
    }

    /// Submit the VM for creation. Returns as soon as the job is accepted.
    ///
    /// # Errors
    /// - [`LifecycleError::Config`] if the spec is invalid or the VM was
    ///   already provisioned (no provider call is made)
    /// - [`LifecycleError::Provision`] if the provider rejects the request
    pub async fn provision(&self, vm: &mut VirtualMachine) -> Result<JobId, LifecycleError> {
        if let Some(job_id) = vm.job_id() {
            return Err(LifecycleError::Config(format!(
                "{} was already provisioned (job {job_id})",
                vm.name()
            )));
        }
        vm.spec().validate()?;

        let spec = vm.spec();
        info!(
            vm = %spec.name,
            template = %spec.template.name,
            offering = %spec.offering,
            zone = %spec.zone,
            "Provisioning VM"
        );

        let job_id = self
            .provider
            .provision(spec)
            .await
            .map_err(|source| LifecycleError::Provision {
                name: spec.name.clone(),
                source,
            })?;

        info!(vm = %vm.name(), job_id = %job_id, "Provisioning submitted");
        vm.record_job(job_id.clone())?;
        Ok(job_id)
    }

    /// Resolve the creation job and record the resulting identity.
    ///
    /// On any error the VM keeps no identity.
    ///
    /// # Errors
    /// [`LifecycleError::Unprovisioned`] if Provision was never called,
    /// otherwise the errors of [`poll::wait_for_creation`].
    pub async fn wait_for_creation(
        &self,
        vm: &mut VirtualMachine,
    ) -> Result<VmId, LifecycleError> {
        if let Some(id) = vm.id() {
            return Ok(id.clone());
        }
        let job_id = vm
            .job_id()
            .cloned()
            .ok_or_else(|| LifecycleError::Unprovisioned {
                name: vm.name().to_string(),
                operation: "wait for creation",
            })?;

        let id = poll::wait_for_creation(
            &self.provider,
            &job_id,
            &self.config.creation_poll,
            &self.cancel,
        )
        .await?;

        vm.record_identity(id.clone());
        Ok(id)
    }

    /// Start the VM. A VM that is already running or starting is left alone.
    ///
    /// # Errors
    /// - [`LifecycleError::Unprovisioned`] before creation completed
    /// - [`LifecycleError::StateTransition`] if the provider rejects the start
    pub async fn start(&self, vm: &VirtualMachine) -> Result<(), LifecycleError> {
        self.start_as(vm, Step::Start).await
    }

    /// Start on behalf of `step`, so errors name the step that failed.
    async fn start_as(&self, vm: &VirtualMachine, step: Step) -> Result<(), LifecycleError> {
        let operation = step.label();
        let id = vm.require_id(operation)?;
        self.transition(
            operation,
            id,
            &[LifecycleState::Running, LifecycleState::Starting],
            || self.provider.start(id),
        )
        .await
    }

    /// Halt the VM. A VM that is already stopped or stopping is left alone.
    ///
    /// # Errors
    /// - [`LifecycleError::Unprovisioned`] before creation completed
    /// - [`LifecycleError::StateTransition`] if the provider rejects the halt
    pub async fn halt(&self, vm: &VirtualMachine) -> Result<(), LifecycleError> {
        let id = vm.require_id("halt")?;
        self.transition(
            "halt",
            id,
            &[LifecycleState::Stopped, LifecycleState::Stopping],
            || self.provider.halt(id),
        )
        .await
    }

    /// Tear the VM down. An identity the provider no longer knows counts as
    /// destroyed. Destroying an already destroyed entity is a no-op.
    ///
    /// # Errors
    /// - [`LifecycleError::Unprovisioned`] before creation completed
    /// - [`LifecycleError::StateTransition`] if the provider rejects teardown
    pub async fn destroy(&self, vm: &mut VirtualMachine) -> Result<(), LifecycleError> {
        if vm.phase() == Phase::Destroyed {
            return Ok(());
        }
        let id = vm.require_id("destroy")?.clone();

        match self
            .transition(
                "destroy",
                &id,
                &[LifecycleState::Destroyed, LifecycleState::Destroying],
                || self.provider.destroy(&id),
            )
            .await
        {
            Ok(()) => {}
            Err(LifecycleError::StateTransition {
                source: ProviderError::NotFound(_),
                ..
            }) => {
                info!(vm_id = %id, "VM already gone");
            }
            Err(e) => return Err(e),
        }

        vm.mark_destroyed();
        Ok(())
    }

    /// Poll until the VM reads `target`.
    ///
    /// # Errors
    /// See [`poll::wait_for_state`].
    pub async fn await_state(
        &self,
        id: &VmId,
        target: LifecycleState,
    ) -> Result<LifecycleState, LifecycleError> {
        poll::wait_for_state(
            &self.provider,
            id,
            target,
            &self.config.transition_poll,
            &self.cancel,
        )
        .await
    }

    /// Take a snapshot and log it.
    pub async fn observe(&self, vm: &VirtualMachine, step: Step) -> Observation {
        let snapshot = self.reporter(vm).snapshot().await;
        info!(
            step = %step,
            vm = %snapshot.name,
            state = ?snapshot.state.as_ref().ok(),
            "Observed VM"
        );
        Observation { step, snapshot }
    }

    /// Run the full sequence: provision, wait, start, halt, start, destroy,
    /// observing the VM after each step.
    ///
    /// Every transition is confirmed by polling before the next step runs.
    /// Terminal errors stop the run; the VM keeps whatever identity it had so
    /// the caller can clean up.
    ///
    /// # Errors
    /// The first terminal error of any step.
    pub async fn run<F>(
        &self,
        vm: &mut VirtualMachine,
        mut on_observe: F,
    ) -> Result<RunReport, LifecycleError>
    where
        F: FnMut(&Observation),
    {
        self.config.validate()?;
        let started_at = Utc::now();
        let mut observations = Vec::new();
        let mut record = |observation: Observation| {
            on_observe(&observation);
            observations.push(observation);
        };

        let job_id = self.provision(vm).await?;
        record(self.observe(vm, Step::Provision).await);

        let vm_id = self.wait_for_creation(vm).await?;
        self.settle(self.config.post_create_settle, "post-create").await?;
        record(self.observe(vm, Step::WaitForCreation).await);

        for (step, settle) in [
            (Step::Start, self.config.post_start_settle),
            (Step::Halt, self.config.post_halt_settle),
            (Step::Restart, self.config.post_start_settle),
        ] {
            info!(step = %step, vm_id = %vm_id, "Running step");
            if step == Step::Halt {
                self.halt(vm).await?;
            } else {
                self.start_as(vm, step).await?;
            }
            self.await_state(&vm_id, step.expected_state()).await?;
            self.settle(settle, "post-transition").await?;
            record(self.observe(vm, step).await);
        }

        self.destroy(vm).await?;
        self.await_state(&vm_id, LifecycleState::Destroyed).await?;
        record(self.observe(vm, Step::Destroy).await);

        Ok(RunReport {
            job_id,
            vm_id,
            observations,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Issue a state-changing request unless the VM already reads as one of
    /// `satisfied`.
    async fn transition<R, Fut>(
        &self,
        operation: &'static str,
        id: &VmId,
        satisfied: &[LifecycleState],
        request: R,
    ) -> Result<(), LifecycleError>
    where
        R: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), ProviderError>>,
    {
        match self.provider.get_state(id).await {
            Ok(state) if satisfied.contains(&state) => {
                info!(vm_id = %id, state = %state, operation, "Already there, skipping");
                return Ok(());
            }
            Ok(state) => {
                info!(vm_id = %id, state = %state, operation, "Requesting transition");
            }
            Err(e) => {
                warn!(vm_id = %id, error = %e, operation, "State read failed, requesting anyway");
            }
        }

        match request().await {
            Ok(()) => Ok(()),
            Err(ProviderError::AlreadyInState(message)) => {
                info!(vm_id = %id, operation, message = %message, "Provider reports no-op");
                Ok(())
            }
            Err(source) => Err(LifecycleError::StateTransition {
                operation,
                vm_id: id.clone(),
                source,
            }),
        }
    }

    async fn settle(&self, delay: Duration, label: &str) -> Result<(), LifecycleError> {
        if delay.is_zero() {
            return Ok(());
        }
        info!(delay_secs = delay.as_secs(), label, "Settling");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(LifecycleError::Cancelled(format!("{label} settle"))),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

//! Compute CLI - runs one VM through its full lifecycle.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use compute::config::{Credentials, RunConfig, API_KEY_ENV, API_SECRET_ENV};
use compute::error::{EXIT_CONFIG, EXIT_RUNTIME};
use compute::providers::exoscale::Exoscale;
use compute::{LifecycleError, Orchestrator, VirtualMachine};

/// Compute CLI - provision, start, halt, restart and destroy one VM.
#[derive(Parser)]
#[command(name = "compute")]
#[command(about = "Drive a compute VM through its lifecycle")]
struct Cli {
    /// API key (or set `EXOSCALE_API_KEY` env var).
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// API secret (or set `EXOSCALE_API_SECRET` env var).
    #[arg(long, env = API_SECRET_ENV, hide_env_values = true)]
    api_secret: Option<String>,

    /// YAML run file describing the VM and timing.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compute API endpoint (overrides the run file).
    #[arg(long)]
    endpoint: Option<String>,

    /// VM name (overrides the run file).
    #[arg(long)]
    name: Option<String>,

    /// Creation poll attempts (overrides the run file).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Seconds between creation polls (overrides the run file).
    #[arg(long)]
    interval: Option<u64>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let credentials = match Credentials::from_parts(cli.api_key.clone(), cli.api_secret.clone()) {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{e}");
            eprintln!("{}", Credentials::usage());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(cli, credentials).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            let code = e
                .downcast_ref::<LifecycleError>()
                .map_or(EXIT_RUNTIME, LifecycleError::exit_code);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli, credentials: Credentials) -> Result<()> {
    let mut run_config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(endpoint) = cli.endpoint {
        run_config.endpoint = endpoint;
    }
    if let Some(name) = cli.name {
        run_config.name = name;
    }
    if let Some(max_attempts) = cli.max_attempts {
        run_config.creation_poll.max_attempts = max_attempts;
    }
    if let Some(interval) = cli.interval {
        run_config.creation_poll.interval_secs = interval;
    }

    let lifecycle = run_config.lifecycle_config()?;
    let provider = Exoscale::new(&run_config.endpoint, credentials)
        .context("Failed to create Exoscale provider")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let orchestrator = Orchestrator::new(provider, lifecycle).with_cancellation(cancel);
    let mut vm = VirtualMachine::new(run_config.vm_spec());

    info!(vm = %vm.name(), endpoint = %run_config.endpoint, "Starting lifecycle run");

    let result = orchestrator
        .run(&mut vm, |observation| println!("{observation}"))
        .await;

    match result {
        Ok(report) => {
            let elapsed = report.finished_at - report.started_at;
            println!(
                "\nLifecycle complete: job {} -> VM {} in {}s",
                report.job_id,
                report.vm_id,
                elapsed.num_seconds()
            );
            Ok(())
        }
        Err(e) => {
            let job = vm.job_id().map_or_else(|| "-".to_string(), ToString::to_string);
            let id = vm.id().map_or_else(|| "-".to_string(), ToString::to_string);
            if vm.id().is_some() && !matches!(vm.phase(), compute::Phase::Destroyed) {
                warn!(vm_id = %id, "VM was left behind and may need manual cleanup");
            }
            Err(anyhow::Error::new(e)
                .context(format!("Lifecycle run for {} failed (job {job}, VM {id})", vm.name())))
        }
    }
}

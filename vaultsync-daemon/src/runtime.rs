use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use vaultsync_core::config::{Config, LogLevel};
use vaultsync_core::{ChangeEvent, ChangeOp};
use vaultsync_sync::{pipeline, DryRunWriter, Orchestrator, PassReport, TargetWriter};

use crate::error::{io_err, DaemonError};
use crate::settle::{wait_until_stable, Settled};
use crate::watcher;

/// Timings that drive the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub interval: Duration,
    pub settle_delay: Duration,
}

impl From<&Config> for LoopTiming {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.interval,
            settle_delay: config.settle_delay,
        }
    }
}

/// What one run of the dispatch loop did.
#[derive(Debug, Default, Clone)]
pub struct LoopSummary {
    pub events: usize,
    pub ticks: usize,
    pub full_passes: usize,
    pub totals: PassReport,
}

/// Start the watch loop and block the current thread until ctrl-c.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Watch until ctrl-c.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    run_until(config, shutdown_signal()).await
}

/// Watch until `shutdown` resolves: initial full pass, then dispatch.
pub async fn run_until<F>(config: Config, shutdown: F) -> Result<(), DaemonError>
where
    F: Future<Output = ()>,
{
    let (_watcher, events) = watcher::watch(&config.vault)?;
    let timing = LoopTiming::from(&config);

    let summary = if config.dry_run {
        let writer = DryRunWriter::new(&config.repo);
        let mut orchestrator = Orchestrator::new(&config, writer)?;
        start(&mut orchestrator, &config.vault, events, timing, shutdown).await?
    } else {
        let mut orchestrator = Orchestrator::new(&config, pipeline::fs_writer(&config))?;
        start(&mut orchestrator, &config.vault, events, timing, shutdown).await?
    };

    tracing::info!(
        events = summary.events,
        ticks = summary.ticks,
        full_passes = summary.full_passes,
        written = summary.totals.written(),
        deleted = summary.totals.deleted(),
        errored = summary.totals.errors.len(),
        "watch stopped",
    );
    Ok(())
}

async fn start<W, F>(
    orchestrator: &mut Orchestrator<W>,
    vault: &Path,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
    timing: LoopTiming,
    shutdown: F,
) -> Result<LoopSummary, DaemonError>
where
    W: TargetWriter,
    F: Future<Output = ()>,
{
    let initial = orchestrator.full_pass()?;
    log_errors(&initial);
    let mut summary = dispatch(orchestrator, vault, events, timing, shutdown).await?;
    summary.full_passes += 1;
    summary.totals.absorb(initial);
    Ok(summary)
}

/// The single-consumer dispatch loop.
///
/// Cancellation is checked first, then queued change events, then the
/// periodic tick. The step in progress always completes before shutdown,
/// and the store is persisted before this returns.
pub async fn dispatch<W, F>(
    orchestrator: &mut Orchestrator<W>,
    vault: &Path,
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    timing: LoopTiming,
    shutdown: F,
) -> Result<LoopSummary, DaemonError>
where
    W: TargetWriter,
    F: Future<Output = ()>,
{
    let mut summary = LoopSummary::default();
    let mut ticker = tokio::time::interval_at(Instant::now() + timing.interval, timing.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break Ok(()),
            event = events.recv() => {
                let Some(event) = event else {
                    break Err(DaemonError::ChannelClosed("vault watcher"));
                };
                summary.events += 1;
                if let Err(err) = handle_event(orchestrator, vault, &event, timing.settle_delay, &mut summary).await {
                    break Err(err);
                }
            }
            _ = ticker.tick() => {
                summary.ticks += 1;
                match orchestrator.tick() {
                    Ok(Some(report)) => {
                        summary.full_passes += 1;
                        log_errors(&report);
                        summary.totals.absorb(report);
                    }
                    Ok(None) => {}
                    Err(err) => break Err(err.into()),
                }
            }
        }
    };

    let persisted = orchestrator.persist();
    match (outcome, persisted) {
        (Err(err), Err(persist_err)) => {
            tracing::error!(error = %persist_err, "could not persist state on shutdown");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Ok(()), Err(persist_err)) => Err(persist_err.into()),
        (Ok(()), Ok(())) => Ok(summary),
    }
}

async fn handle_event<W: TargetWriter>(
    orchestrator: &mut Orchestrator<W>,
    vault: &Path,
    event: &ChangeEvent,
    settle_delay: Duration,
    summary: &mut LoopSummary,
) -> Result<(), DaemonError> {
    if event.op != ChangeOp::Removed {
        let path: PathBuf = vault.join(&event.path);
        if wait_until_stable(&path, settle_delay).await == Settled::Unstable {
            tracing::warn!(path = %event.path.display(), "file still changing; processing anyway");
        }
    }

    let report = orchestrator.apply_change(event)?;
    tracing::debug!(
        op = %event.op,
        path = %event.path.display(),
        rendered = report.rendered,
        "change applied",
    );
    log_errors(&report);
    summary.totals.absorb(report);
    Ok(())
}

fn log_errors(report: &PassReport) {
    for err in &report.errors {
        tracing::warn!(error = %err, "document skipped");
    }
    if let Some(err) = &report.persist_error {
        tracing::warn!(error = %err, "state not persisted");
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c, shutting down"),
        Err(err) => {
            tracing::error!(error = %err, "ctrl-c handler failed; shutting down");
        }
    }
}

/// Install the fmt subscriber on stderr. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

//! Shared sync pipeline entrypoint used by the CLI and the daemon.

use vaultsync_core::config::Config;

use crate::reconcile::Orchestrator;
use crate::report::PassReport;
use crate::writer::{DryRunWriter, FsWriter};
use crate::SyncError;

/// Filesystem writer for the configured repository.
pub fn fs_writer(config: &Config) -> FsWriter {
    FsWriter::new(&config.repo, &config.content_dir)
}

/// Run one full pass, honouring `config.dry_run`.
///
/// This is the canonical entrypoint for `vaultsync sync`.
pub fn run(config: &Config) -> Result<PassReport, SyncError> {
    if config.dry_run {
        return dry_run(config).map(|(report, _)| report);
    }
    Orchestrator::new(config, fs_writer(config))?.full_pass()
}

/// Run one full pass against a recording writer.
///
/// Neither tree is modified and the store is not persisted. The returned
/// writer holds every pending change.
pub fn dry_run(config: &Config) -> Result<(PassReport, DryRunWriter), SyncError> {
    let mut config = config.clone();
    config.dry_run = true;
    let mut orchestrator = Orchestrator::new(&config, DryRunWriter::new(&config.repo))?;
    let report = orchestrator.full_pass()?;
    Ok((report, orchestrator.into_writer()))
}

//! `vaultsync sync`: one full reconciliation pass.

use anyhow::{bail, Context, Result};
use clap::Args;

use vaultsync_sync::{pipeline, DeleteResult, PassReport, WriteResult};

use super::{dry_run_layer, GlobalArgs};

/// Arguments for `vaultsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Show what would be written or deleted without touching either tree.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load(dry_run_layer(self.dry_run))?;
        let report = pipeline::run(&config)
            .with_context(|| format!("sync failed for vault '{}'", config.vault.display()))?;

        print_report(&report, config.dry_run);

        if !report.errors.is_empty() {
            bail!("{} document(s) could not be synced", report.errors.len());
        }
        if let Some(err) = &report.persist_error {
            bail!("state could not be saved: {err}");
        }
        Ok(())
    }
}

fn print_report(report: &PassReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };

    if report.written() == 0 && report.deleted() == 0 && report.errors.is_empty() {
        println!(
            "{prefix}✓ nothing to do ({} notes, {} published)",
            report.processed, report.published
        );
        return;
    }

    println!(
        "{prefix}✓ synced {} notes ({} published, {} written, {} deleted)",
        report.processed,
        report.published,
        report.written(),
        report.deleted()
    );

    for w in &report.writes {
        match w {
            WriteResult::Written { path } => println!("  ✎  {}", path.display()),
            WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
            WriteResult::Unchanged { .. } => {}
        }
    }
    for d in &report.deletions {
        match d {
            DeleteResult::Deleted { path } => println!("  ✗  {}", path.display()),
            DeleteResult::WouldDelete { path } => println!("  -  {}", path.display()),
            DeleteResult::Missing { .. } => {}
        }
    }
    for err in &report.errors {
        println!("  !  {err}");
    }
}

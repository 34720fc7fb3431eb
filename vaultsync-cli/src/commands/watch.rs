//! `vaultsync watch`: follow the vault until ctrl-c.

use anyhow::{Context, Result};
use clap::Args;

use super::{dry_run_layer, GlobalArgs};

/// Arguments for `vaultsync watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Record changes without writing the output tree or the state store.
    #[arg(long)]
    pub dry_run: bool,
}

impl WatchArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load(dry_run_layer(self.dry_run))?;
        let vault = config.vault.clone();
        vaultsync_daemon::start_blocking(config)
            .with_context(|| format!("watch failed for vault '{}'", vault.display()))
    }
}

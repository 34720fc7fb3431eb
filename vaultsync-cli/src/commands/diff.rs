//! `vaultsync diff`: show unified diffs for what sync would write.

use anyhow::{Context, Result};
use clap::Args;

use vaultsync_sync::diff::diff;

use super::GlobalArgs;

/// Arguments for `vaultsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {}

impl DiffArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.load(Default::default())?;

        let result = diff(&config)
            .with_context(|| format!("diff failed for vault '{}'", config.vault.display()))?;

        for err in &result.report.errors {
            eprintln!("! {err}");
        }

        if result.diffs.is_empty() {
            println!("No differences.");
            return Ok(());
        }

        for diff in result.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}

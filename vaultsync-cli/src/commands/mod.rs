pub mod config;
pub mod diff;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use vaultsync_core::config::{self as core_config, Config, ConfigFile, LogLevel};

/// Flags accepted by every subcommand. They override the config file and
/// the environment.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file (default: <config dir>/vaultsync/config.yaml).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Vault root.
    #[arg(long, global = true, value_name = "DIR")]
    pub vault: Option<PathBuf>,

    /// Hugo repository root.
    #[arg(long, global = true, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Content directory inside the repository.
    #[arg(long, global = true, value_name = "DIR")]
    pub content_dir: Option<PathBuf>,

    /// debug | info | warn | error
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl GlobalArgs {
    /// The flag layer.
    pub fn flags(&self) -> ConfigFile {
        ConfigFile {
            vault: self.vault.clone(),
            repo: self.repo.clone(),
            content_dir: self.content_dir.clone(),
            log_level: self.log_level,
            ..ConfigFile::default()
        }
    }

    /// Resolve the configuration and install logging at its level.
    pub fn load(&self, overrides: ConfigFile) -> Result<Config> {
        let config = core_config::load(self.config.as_deref(), self.flags().merge(overrides))
            .context("failed to load configuration")?;
        vaultsync_daemon::init_tracing(config.log_level);
        Ok(config)
    }

    /// `--config` or the default location.
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => core_config::default_config_path()
                .context("could not determine the config directory"),
        }
    }
}

/// `Some(true)` when the flag was given, otherwise leave the lower layers alone.
pub(crate) fn dry_run_layer(dry_run: bool) -> ConfigFile {
    ConfigFile {
        dry_run: dry_run.then_some(true),
        ..ConfigFile::default()
    }
}

//! `vaultsync config show|init`

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use vaultsync_core::config::{Config, ConfigFile};

use super::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration as YAML.
    Show,

    /// Write a config file from --vault, --repo and --content-dir.
    Init {
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommand, global: &GlobalArgs) -> Result<()> {
    match command {
        ConfigCommand::Show => show(global),
        ConfigCommand::Init { force } => init(global, force),
    }
}

fn show(global: &GlobalArgs) -> Result<()> {
    let config = global.load(ConfigFile::default())?;
    let state_file = config
        .state_file()
        .context("could not determine the state file location")?;
    let yaml = serde_yaml::to_string(&config.to_file()).context("failed to render config")?;
    print!("{yaml}");
    println!("# origin tag: {}", config.origin_tag());
    println!("# state file: {}", state_file.display());
    Ok(())
}

fn init(global: &GlobalArgs, force: bool) -> Result<()> {
    let path = global.config_path()?;
    if path.exists() && !force {
        bail!(
            "config file already exists at '{}' (use --force to replace it)",
            path.display()
        );
    }

    let config = Config::from_file(global.flags())
        .and_then(Config::validate)
        .context("vault and repo must name existing directories")?;

    // Only the keys the user chose; everything else keeps its default.
    let layer = ConfigFile {
        vault: Some(config.vault),
        repo: Some(config.repo),
        content_dir: global.content_dir.clone(),
        log_level: global.log_level,
        ..ConfigFile::default()
    };
    layer
        .save_at(&path)
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    println!("✓ Wrote {}", path.display());
    Ok(())
}

//! vaultsync: publish an Obsidian vault into a Hugo content tree.
//!
//! # Usage
//!
//! ```text
//! vaultsync [--config <file>] [--vault <dir>] [--repo <dir>] sync [--dry-run]
//! vaultsync watch [--dry-run]
//! vaultsync status [--json]
//! vaultsync diff
//! vaultsync config show|init [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, diff::DiffArgs, status::StatusArgs, sync::SyncArgs, watch::WatchArgs,
    GlobalArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "vaultsync",
    version,
    about = "Reconcile an Obsidian vault with a Hugo content directory",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one full reconciliation pass.
    Sync(SyncArgs),

    /// Run a full pass, then follow vault changes until ctrl-c.
    Watch(WatchArgs),

    /// Show tracked notes and whether they are in sync.
    Status(StatusArgs),

    /// Show a unified diff of what sync would write.
    Diff(DiffArgs),

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Watch(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
        Commands::Diff(args) => args.run(&cli.global),
        Commands::Config { command } => commands::config::run(command, &cli.global),
    }
}

//! Command-line interface definitions using clap derive API.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::dispatcher::DispatchMode;
use crate::settings::Settings;

/// Concurrent salary directory CLI
#[derive(Parser)]
#[command(name = "chash-cli")]
#[command(about = "Runs a command file against a concurrent, hash-ordered salary directory")]
#[command(version)]
pub struct Cli {
    /// Configuration file to use instead of ./chash.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a command file (the default)
    Run(RunArgs),
    /// Parse a command file and report what it contains
    Check {
        /// Path to the command file
        #[arg(long)]
        commands: Option<PathBuf>,
    },
    /// Print the ordering key of each name
    Hash {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to the command file
    #[arg(long)]
    pub commands: Option<PathBuf>,

    /// Path to the result output file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to the event log
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Run commands one at a time, in file order
    #[arg(long)]
    pub serial: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(commands) = &self.commands {
            settings.paths.commands = commands.clone();
        }
        if let Some(output) = &self.output {
            settings.paths.output = output.clone();
        }
        if let Some(log) = &self.log {
            settings.paths.event_log = log.clone();
        }
        if self.serial {
            settings.dispatch.mode = DispatchMode::Serial;
        }
    }
}

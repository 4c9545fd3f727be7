//! Main entry point for the chash CLI.

use anyhow::Result;
use chash::{
    batch,
    cli::{self, Commands, RunArgs},
    key::name_key,
    settings::Settings,
    telemetry,
};
use clap::Parser;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = cli::Cli::parse();

    // Load settings
    let mut settings = Settings::load_from(args.config.as_deref())?;

    let command = args
        .command
        .unwrap_or_else(|| Commands::Run(RunArgs::default()));
    if let Commands::Run(run_args) = &command {
        run_args.apply(&mut settings);
    }

    // Initialize logging
    telemetry::init(&settings.logging.level)?;

    // Execute the requested command
    match command {
        Commands::Run(_) => batch::run(&settings).map(|_| ()),
        Commands::Check { commands } => {
            let path = commands.unwrap_or_else(|| settings.paths.commands.clone());
            batch::check(&path).map(|_| ())
        }
        Commands::Hash { names } => {
            for name in names {
                println!("{} {}", name_key(&name), name);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
    }
}

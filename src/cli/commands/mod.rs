//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - `run()` function to execute the command

use crate::cli::{Cli, Commands, OutputFormat};
use crate::config::Config;
use crate::error::Result;

pub mod config;
pub mod search;

/// State shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = Config::load(cli.config.as_deref())?;
        Ok(Self {
            config,
            format: cli.output_format(),
        })
    }
}

pub fn run(ctx: &CommandContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Search(args) => search::run(ctx, args),
        Commands::Config(args) => config::run(ctx, args),
    }
}

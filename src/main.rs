//! normativa - hybrid retrieval over regulatory directives

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use normativa::Result;
use normativa::cli::commands::{self, CommandContext};
use normativa::cli::{Cli, output};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.output_format().is_machine_readable() {
                // Structured error on stdout so scripts can parse it
                let response = output::robot_error_structured(&e);
                println!(
                    "{}",
                    serde_json::to_string(&response).unwrap_or_default()
                );
            } else {
                eprintln!("Error: {e}");
                eprintln!("Hint: {}", e.to_structured().suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let ctx = CommandContext::from_cli(cli)?;
    commands::run(&ctx, &cli.command)
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn,normativa=info",
        1 => "info,normativa=debug",
        2 => "debug,normativa=trace",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.output_format().is_machine_readable() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

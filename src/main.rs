//! Small CLI over the hashing service. Output goes to stdout, logs to stderr.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use cli::Cli;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let default_level = config.log_level.as_deref().unwrap_or("warn");
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let outcome = cli::run(cli.command, &config, &mut std::io::stdout().lock())?;
    Ok(outcome.into())
}

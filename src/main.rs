use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use tracing_subscriber::EnvFilter;

use fincli::cli::Cli;
use fincli::dispatcher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v; logs go to stderr so stdout stays parseable
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if cli.no_color || cli.json || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    dispatcher::dispatch_command(cli.command, cli.json)
}

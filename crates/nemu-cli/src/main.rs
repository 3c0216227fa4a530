//! Nemu CLI - builds a static site and pushes it to a nemu server as one
//! streamed tar.gz upload.

mod cli;
mod commands;
mod error;
mod logging;
mod output;
mod progress;
mod render;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    logging::init(cli.verbose, cli.quiet);
    let formatter = output::create_formatter(cli.json, cli.verbose, cli.quiet);

    let result = match &cli.command {
        cli::Commands::Push(args) => {
            commands::push::execute(args, &*formatter, !(cli.quiet || cli.json), cli.json)
        }
        cli::Commands::Hash(args) => commands::hash::execute(args, &*formatter),
        cli::Commands::Completion { shell } => {
            commands::completion::execute(*shell);
            Ok(())
        }
    };

    if cli.json
        && let Err(err) = &result
    {
        formatter.format_error(err);
    }
    result
}

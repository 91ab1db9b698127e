//! Labelforge CLI - dataset snapshots, split assignment, and training jobs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod context;

use cli::Cli;
use commands::common::ExitCode;
use commands::{class, model, poll, snapshot, split, train};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let outcome = match &cli.command {
        cli::Commands::Snapshot(args) => snapshot::execute(args, &cli.global).await,
        cli::Commands::Split(args) => split::execute(args, &cli.global).await,
        cli::Commands::Train(args) => train::execute(args, &cli.global).await,
        cli::Commands::Poll(args) => poll::execute(args, &cli.global).await,
        cli::Commands::Model(args) => model::execute(args, &cli.global).await,
        cli::Commands::Class(args) => class::execute(args, &cli.global).await,
    };

    match outcome {
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => std::process::exit(*code),
            None => Err(err),
        },
        ok => ok,
    }
}

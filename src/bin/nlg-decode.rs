//! Command-line interface for nlg-decode.

use anyhow::Result;
use clap::Parser;
use nlg_decode::cli::{cmd_detokenize, cmd_evaluate, cmd_filter, cmd_sample, Cli, Command};
use tracing::Level;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Filter(args) => cmd_filter(args),
        Command::Sample(args) => cmd_sample(args),
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::Detokenize(args) => cmd_detokenize(args),
    }
}

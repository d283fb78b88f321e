//! # parsim-cli
//!
//! The `parsim` binary: parses command-line arguments and dispatches to the
//! subcommand handlers. Exit codes: 0 clean end, 1 structural error, 2
//! runtime abort.

#![forbid(unsafe_code)]

use crate::args::{Cli, Command};
use clap::Parser;

mod args;
mod commands;
mod logging;

fn main() {
    let args = Cli::parse();
    logging::init(args.log, args.verbose);

    let code = match args.command {
        Command::Run(opts) => commands::run::exec(opts),
        Command::Validate { graph } => commands::validate::exec(graph),
        Command::ListPartitioners => commands::list_partitioners::exec(),
    };
    std::process::exit(code);
}

//! # parsim-cli::args
//!
//! Command-line argument structure, using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, default_value = "human")]
    pub log: LogFormat,

    /// Verbosity: 0 warn, 1 info, 2 debug, 3+ trace.
    #[arg(long, global = true, default_value_t = 1)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulation from a graph file.
    Run(RunOpts),
    /// Validate a graph file for structural errors.
    Validate {
        #[arg(value_name = "GRAPH_PATH")]
        graph: PathBuf,
    },
    /// List the available partitioners.
    ListPartitioners,
}

#[derive(Args, Debug)]
pub struct RunOpts {
    /// Path to the configuration graph (TOML or YAML).
    #[arg(short, long)]
    pub graph: PathBuf,

    /// Component-to-partition assignment scheme.
    #[arg(long, default_value = "single")]
    pub partitioner: String,

    /// The core timebase.
    #[arg(long, default_value = "1ps")]
    pub timebase: String,

    /// Stop unconditionally at this simulated time, e.g. "1us".
    #[arg(long)]
    pub stop_at: Option<String>,

    /// Log simulated-time progress at this period, e.g. "1ms".
    #[arg(long)]
    pub heartbeat_period: Option<String>,

    /// Threads per rank.
    #[arg(long, default_value_t = 1)]
    pub threads: u32,

    #[arg(long, value_enum, default_value = "both")]
    pub run_mode: RunModeArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunModeArg {
    /// Wire up, dump the result as JSON, and exit.
    Init,
    Run,
    Both,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

//! # parsim-cli::commands::run
//!
//! Loads a graph, stands up a single-rank runtime, and runs it. Multi-rank
//! launches come from the job launcher (one process per rank with a real
//! transport); this binary always runs rank 0 of a one-rank world.

use crate::args::{RunModeArg, RunOpts};
use parsim_core::{
    runtime::{RunMode, RunOutcome, Runtime, RuntimeConfig},
    transport::SoloTransport,
};
use parsim_types::{config::ConfigGraph, id::WorldShape};
use std::sync::Arc;

pub fn exec(opts: RunOpts) -> i32 {
    let graph = match ConfigGraph::from_path(&opts.graph) {
        Ok(g) => g,
        Err(e) => {
            tracing::error!(error = %e, "cannot load graph");
            return 1;
        }
    };

    let config = RuntimeConfig {
        timebase: opts.timebase,
        partitioner: opts.partitioner,
        stop_at: opts.stop_at,
        heartbeat_period: opts.heartbeat_period,
        run_mode: match opts.run_mode {
            RunModeArg::Init => RunMode::Init,
            RunModeArg::Run => RunMode::Run,
            RunModeArg::Both => RunMode::Both,
        },
        ..RuntimeConfig::default()
    };

    let factory = parsim_elements::builtin_factory();
    let world = WorldShape::new(1, opts.threads);
    let mut runtime = Runtime::new(config, factory, Arc::new(SoloTransport), world);
    if let Err(e) = runtime.hook_os_signals() {
        tracing::warn!(error = %e, "cannot install signal handlers");
    }

    match runtime.run(graph) {
        Ok(summary) => {
            if let Some(dump) = &summary.init_dump {
                println!(
                    "{}",
                    serde_json::to_string_pretty(dump).unwrap_or_else(|_| dump.to_string())
                );
                return 0;
            }
            match summary.outcome {
                RunOutcome::Clean => 0,
                RunOutcome::Signal | RunOutcome::Deadline => 2,
            }
        }
        Err(e) => e.exit_code(),
    }
}

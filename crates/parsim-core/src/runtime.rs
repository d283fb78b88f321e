//! # parsim-core::runtime
//!
//! The per-process runtime: owns the TimeLord, the Factory, the Transport
//! and the world shape, and drives one run end to end — validate, partition,
//! wire up, spawn one OS thread per local partition, run the phases, join,
//! aggregate. There are no process-wide singletons, so tests can stand up
//! many runtimes (and whole multi-rank worlds) in one process.

use crate::{
    factory::Factory,
    partition::{validate_assignment, PartitionerRegistry},
    signals::SignalFlags,
    sim::{AbortKind, Scheduler, SchedulerStats, TraceSink},
    sync::{epoch_periods, thread::ThreadSync, ProcessShared, SyncManager},
    timelord::TimeLord,
    transport::Transport,
    wireup::{self, wire_up, WireUpError},
};
use parsim_types::{
    config::ConfigGraph,
    errors::{ConfigError, PartitionError, SimError},
    id::{RankInfo, WorldShape},
    time::SimTime,
};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Materialize wire-up, dump it, and stop.
    Init,
    /// Assume wire-up is sound and run.
    Run,
    /// The default: wire up, then run.
    Both,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// The core timebase, e.g. "1ps".
    pub timebase: String,
    pub partitioner: String,
    pub stop_at: Option<String>,
    pub heartbeat_period: Option<String>,
    /// Epoch cadence used when no cross-partition link bounds the skew.
    pub exit_check_period: String,
    pub run_mode: RunMode,
    pub barrier_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timebase: "1ps".to_string(),
            partitioner: "single".to_string(),
            stop_at: None,
            heartbeat_period: None,
            exit_check_period: "100ns".to_string(),
            run_mode: RunMode::Both,
            barrier_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Clean,
    Signal,
    Deadline,
}

/// What a run produced, aggregated over this process's threads.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub end_cycle: SimTime,
    pub events_delivered: u64,
    pub clock_ticks: u64,
    pub sync_rounds: u64,
    pub rank_epochs: u64,
    /// Conservation pair: events handed to peers vs. received from them.
    pub rank_events_sent: u64,
    pub rank_events_received: u64,
    pub outcome: RunOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_dump: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("structural errors in configuration graph ({})", .0.len())]
    Structural(Vec<ConfigError>),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error("worker thread panicked")]
    WorkerPanic,
}

impl From<WireUpError> for RunError {
    fn from(e: WireUpError) -> Self {
        match e {
            WireUpError::Config(c) => RunError::Config(c),
            WireUpError::Sim(s) => RunError::Sim(s),
        }
    }
}

impl RunError {
    /// Process exit code per the CLI contract: 1 structural, 2 runtime.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Structural(_) | RunError::Config(_) | RunError::Partition(_) => 1,
            _ => 2,
        }
    }

    fn subsystem(&self) -> &'static str {
        match self {
            RunError::Structural(_) | RunError::Config(_) => "config",
            RunError::Partition(_) => "partition",
            RunError::Sim(SimError::BarrierTimeout(_)) => "sync",
            RunError::Sim(SimError::Transport(_)) => "transport",
            RunError::Sim(_) => "core",
            RunError::WorkerPanic => "core",
        }
    }
}

struct ThreadReport {
    stats: SchedulerStats,
    end_cycle: SimTime,
    aborted: Option<AbortKind>,
    error: Option<SimError>,
}

pub struct Runtime {
    config: RuntimeConfig,
    factory: Arc<Factory>,
    transport: Arc<dyn Transport>,
    world: WorldShape,
    partitioners: PartitionerRegistry,
    signals: SignalFlags,
    trace: Option<TraceSink>,
}

impl Runtime {
    pub fn new(
        config: RuntimeConfig,
        factory: Factory,
        transport: Arc<dyn Transport>,
        world: WorldShape,
    ) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
            transport,
            world,
            partitioners: PartitionerRegistry::standard(),
            signals: SignalFlags::unhooked(),
            trace: None,
        }
    }

    /// Registers OS signal handlers into this runtime's flag set.
    pub fn hook_os_signals(&mut self) -> std::io::Result<()> {
        self.signals = SignalFlags::install()?;
        Ok(())
    }

    /// The latched signal flags; tests raise these directly.
    pub fn signals(&self) -> &SignalFlags {
        &self.signals
    }

    pub fn partitioners_mut(&mut self) -> &mut PartitionerRegistry {
        &mut self.partitioners
    }

    /// Installs a sink that records every event delivery for determinism
    /// auditing.
    pub fn set_trace(&mut self, sink: TraceSink) {
        self.trace = Some(sink);
    }

    /// Runs one simulation to completion for this process.
    pub fn run(&self, graph: ConfigGraph) -> Result<RunSummary, RunError> {
        match self.run_inner(graph) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::error!("FATAL [{}] {e}", e.subsystem());
                Err(e)
            }
        }
    }

    fn run_inner(&self, mut graph: ConfigGraph) -> Result<RunSummary, RunError> {
        if self.transport.num_ranks() != self.world.ranks {
            return Err(RunError::Sim(SimError::Transport(format!(
                "transport spans {} ranks but the world declares {}",
                self.transport.num_ranks(),
                self.world.ranks
            ))));
        }
        let lord = TimeLord::new(&self.config.timebase)?;

        let errors = graph.check_structural_errors(&*self.factory);
        if !errors.is_empty() {
            for e in &errors {
                tracing::error!(error = %e, "structural error");
            }
            return Err(RunError::Structural(errors));
        }

        // Partition unless the front-end pre-assigned every component.
        if graph.components.iter().any(|c| c.rank.is_none()) {
            let partitioner = self.partitioners.lookup(&self.config.partitioner)?;
            tracing::info!(partitioner = partitioner.name(), "partitioning graph");
            partitioner.partition(&mut graph, self.world)?;
        }
        validate_assignment(&graph, self.world)?;

        let my_rank = self.transport.my_rank();
        let mut wiring = wire_up(graph, my_rank, self.world, &lord)?;
        wireup::exchange_link_info(&mut wiring, &*self.transport)?;
        tracing::debug!(
            min_part = wiring.min_part,
            interthread_min = wiring.interthread_min,
            "wire-up complete"
        );

        if self.config.run_mode == RunMode::Init {
            let dump = wireup::describe(&wiring, my_rank);
            return Ok(RunSummary {
                end_cycle: 0,
                events_delivered: 0,
                clock_ticks: 0,
                sync_rounds: 0,
                rank_epochs: 0,
                rank_events_sent: 0,
                rank_events_received: 0,
                outcome: RunOutcome::Clean,
                init_dump: Some(dump),
            });
        }

        let exit_check = lord.cycles(&self.config.exit_check_period)?;
        let (rank_period, thread_period) = epoch_periods(
            self.world,
            wiring.min_part,
            wiring.interthread_min,
            exit_check,
        );
        let stop_at = self
            .config
            .stop_at
            .as_deref()
            .map(|s| lord.cycles(s))
            .transpose()?;
        let heartbeat = self
            .config
            .heartbeat_period
            .as_deref()
            .map(|s| lord.cycles(s))
            .transpose()?;

        let shared = ProcessShared::new(self.world.threads, self.config.barrier_timeout);
        let multi = self.world.partitions() > 1;
        let rank_sync = Arc::clone(&wiring.rank_sync);

        let mut handles = Vec::new();
        for mut seed in wiring.seeds {
            let thread = seed.thread;
            let sync = if multi {
                let inboxes = seed.inboxes.take().expect("thread inboxes already taken");
                Some(SyncManager::new(
                    RankInfo::new(my_rank, thread),
                    self.world,
                    rank_period,
                    thread_period,
                    ThreadSync::new(thread, inboxes),
                    Arc::clone(&rank_sync),
                    Arc::clone(&shared),
                    Arc::clone(&self.transport),
                ))
            } else {
                None
            };
            let world = self.world;
            let factory = Arc::clone(&self.factory);
            let signals = self.signals.clone();
            let trace = self.trace.clone();
            let handle = std::thread::Builder::new()
                .name(format!("parsim-{my_rank}-{thread}"))
                .spawn(move || {
                    let mut sched = Scheduler::new(
                        seed, my_rank, world, lord, factory, signals, sync, stop_at, heartbeat,
                        trace,
                    );
                    let result = (|| {
                        sched.build_components()?;
                        sched.init_phases()?;
                        sched.setup()?;
                        sched.run()?;
                        sched.complete_phases()?;
                        Ok(())
                    })();
                    let error = match result {
                        Ok(()) => {
                            sched.finish();
                            None
                        }
                        Err(e) => {
                            sched.emergency_shutdown_all();
                            Some(e)
                        }
                    };
                    ThreadReport {
                        stats: sched.stats.clone(),
                        end_cycle: sched.end_cycle(),
                        aborted: sched.aborted(),
                        error,
                    }
                })
                .expect("spawn scheduler thread");
            handles.push(handle);
        }

        let mut summary = RunSummary {
            end_cycle: 0,
            events_delivered: 0,
            clock_ticks: 0,
            sync_rounds: 0,
            rank_epochs: 0,
            rank_events_sent: 0,
            rank_events_received: 0,
            outcome: RunOutcome::Clean,
            init_dump: None,
        };
        let mut first_error: Option<SimError> = None;
        let mut panicked = false;
        for handle in handles {
            match handle.join() {
                Err(_) => panicked = true,
                Ok(report) => {
                    summary.end_cycle = summary.end_cycle.max(report.end_cycle);
                    summary.events_delivered += report.stats.events_delivered;
                    summary.clock_ticks += report.stats.clock_ticks;
                    summary.sync_rounds += report.stats.sync_rounds;
                    summary.rank_epochs = summary.rank_epochs.max(report.stats.rank_epochs);
                    match report.aborted {
                        Some(AbortKind::Signal) => summary.outcome = RunOutcome::Signal,
                        Some(AbortKind::Deadline) => {
                            if summary.outcome == RunOutcome::Clean {
                                summary.outcome = RunOutcome::Deadline;
                            }
                        }
                        None => {}
                    }
                    if first_error.is_none() {
                        first_error = report.error;
                    }
                }
            }
        }
        if panicked {
            return Err(RunError::WorkerPanic);
        }
        if let Some(e) = first_error {
            return Err(RunError::Sim(e));
        }
        summary.rank_events_sent = rank_sync.sent_total.load(Ordering::Relaxed);
        summary.rank_events_received = rank_sync.received_total.load(Ordering::Relaxed);

        tracing::info!(
            end_cycle = summary.end_cycle,
            events = summary.events_delivered,
            syncs = summary.sync_rounds,
            "simulation finished"
        );
        Ok(summary)
    }
}

//! # parsim-core::prelude
//!
//! Re-exports of the most commonly used types for element crates and tests.

pub use crate::{
    activity::{
        Activity, Queued, CLOCK_PRIORITY, EVENT_PRIORITY, EXIT_PRIORITY, STOP_PRIORITY,
        SYNC_PRIORITY,
    },
    component::{BuildCtx, Component, SimCtx},
    event::Event,
    factory::Factory,
    link::LinkMap,
    runtime::{RunOutcome, RunSummary, Runtime, RuntimeConfig},
    sim::Scheduler,
    timelord::{TimeConverter, TimeLord},
    transport::{LocalTransport, SoloTransport, Transport},
    vortex::TimeVortex,
};

pub use parsim_types::{
    config::{ConfigComponent, ConfigGraph, ConfigLink},
    errors::{ConfigError, PartitionError, SimError},
    id::{ComponentId, HandlerToken, LinkId, RankInfo, WorldShape},
    params::Params,
    time::{SimTime, TimeQuantity, MAX_SIM_TIME, SIM_EPOCH},
};

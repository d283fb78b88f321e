//! # parsim-types::errors
//!
//! Common error types for the workspace. `thiserror` keeps the variants
//! descriptive; every variant carries enough context to identify the
//! subsystem and the invariant violated, because fatal handling prints a
//! single FATAL line built from these.

use crate::id::{ComponentId, LinkId};
use crate::time::SimTime;
use thiserror::Error;

/// Runtime errors raised inside the simulation core.
#[derive(Error, Debug, Clone)]
pub enum SimError {
    #[error("send on link {0} before wire-up completed")]
    LinkUnconfigured(LinkId),
    #[error("send on link {0} after prepare-for-complete")]
    LinkClosed(LinkId),
    #[error("recv on push-style link {0}")]
    LinkNotPolled(LinkId),
    #[error("component {0} has no port named '{1}'")]
    NoSuchPort(ComponentId, String),
    #[error("pop from an empty time vortex")]
    EmptyVortex,
    #[error("clock with factor {0} was never registered")]
    UnknownClock(SimTime),
    #[error("sync barrier timed out after {0} ms")]
    BarrierTimeout(u64),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("delivery cookie collision on link '{0}'")]
    CookieCollision(String),
    #[error("component '{0}' failed during {1}: {2}")]
    ComponentFailure(String, &'static str, String),
}

/// Structural errors raised while validating or loading a ConfigGraph.
/// All of these are fatal at graph-validation time; the simulation never
/// starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading graph file: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("duplicate component name: '{0}'")]
    DuplicateComponentName(String),
    #[error("dangling link '{0}': only one endpoint is connected")]
    DanglingLink(String),
    #[error("link '{0}' endpoint references unknown component")]
    UnknownComponent(String),
    #[error("component '{comp}' of unknown type '{ty}'")]
    UnknownComponentType { comp: String, ty: String },
    #[error("component '{comp}' (type '{ty}') has no port named '{port}'")]
    UnknownPort {
        comp: String,
        ty: String,
        port: String,
    },
    #[error("link '{0}' crosses partitions with zero latency on both halves")]
    ZeroPartitionLatency(String),
    #[error("link '{0}' latency is below one core cycle")]
    SubCycleLatency(String),
    #[error("link '{0}' has more than two endpoints")]
    TooManyEndpoints(String),
    #[error("cannot parse time quantity '{0}'")]
    BadTimeString(String),
    #[error("unknown unit in time quantity '{0}'")]
    BadTimeUnit(String),
    #[error("parameter '{key}' of component '{comp}': {message}")]
    BadParameter {
        comp: String,
        key: String,
        message: String,
    },
}

/// Errors raised by partitioners.
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("unknown partitioner '{0}'")]
    UnknownPartitioner(String),
    #[error("component '{comp}' assigned out-of-range partition {rank}:{thread}")]
    OutOfRange {
        comp: String,
        rank: u32,
        thread: u32,
    },
    #[error("no_cut link '{0}' spans partitions")]
    NoCutViolated(String),
    #[error("partitioner left component '{0}' unassigned")]
    Unassigned(String),
    #[error("external partitioner '{0}' failed: {1}")]
    External(String, String),
}

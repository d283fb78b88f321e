//! # parsim-types::id
//!
//! Core identifier types. Distinct types for different kinds of IDs prevent
//! a `ComponentId` from being handed where a `LinkId` is expected.

use serde::{Deserialize, Serialize};

/// A globally unique identifier for a component within a run.
///
/// Invariant: top-level components get contiguous IDs from the graph builder,
/// shifted left by [`SUBCOMPONENT_BITS`]. The low bits distinguish
/// sub-components; a value of 0 in the low bits is the parent itself, so a
/// sub-component ID always embeds its parent's ID.
pub type ComponentId = u64;

/// Number of low bits of a [`ComponentId`] reserved for sub-component slots.
pub const SUBCOMPONENT_BITS: u32 = 16;

/// Builds the `ComponentId` for the n-th top-level component of a graph.
pub fn component_id(ordinal: u64) -> ComponentId {
    ordinal << SUBCOMPONENT_BITS
}

/// Builds the ID of the `slot`-th sub-component of `parent`. Slots count
/// from 0; the stored low bits are `slot + 1` so the parent's own ID stays
/// distinct.
pub fn subcomponent_id(parent: ComponentId, slot: u64) -> ComponentId {
    debug_assert!(slot + 1 < (1 << SUBCOMPONENT_BITS));
    (parent & !((1 << SUBCOMPONENT_BITS) - 1)) | (slot + 1)
}

/// Returns the parent ID of a sub-component, or the ID itself for a
/// top-level component.
pub fn parent_id(id: ComponentId) -> ComponentId {
    id & !((1 << SUBCOMPONENT_BITS) - 1)
}

/// Index of a link half in its owning scheduler's link arena.
pub type LinkId = usize;

/// Sentinel for a link half whose pair has not been wired yet.
pub const LINK_UNPAIRED: LinkId = usize::MAX;

/// An opaque token returned by handler registration, used to deregister.
pub type HandlerToken = u64;

/// The position of a partition in the world: which process (rank) and which
/// thread within that process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RankInfo {
    pub rank: u32,
    pub thread: u32,
}

impl RankInfo {
    pub fn new(rank: u32, thread: u32) -> Self {
        Self { rank, thread }
    }

    /// True if both halves live in the same process.
    pub fn same_rank(&self, other: &RankInfo) -> bool {
        self.rank == other.rank
    }
}

impl std::fmt::Display for RankInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.rank, self.thread)
    }
}

/// The extent of the world: how many ranks, and how many threads per rank.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldShape {
    pub ranks: u32,
    pub threads: u32,
}

impl WorldShape {
    pub fn new(ranks: u32, threads: u32) -> Self {
        Self { ranks, threads }
    }

    /// Total number of partitions in the world.
    pub fn partitions(&self) -> u32 {
        self.ranks * self.threads
    }

    /// Maps a flat partition ordinal onto a `(rank, thread)` pair. Ordinals
    /// fill each rank's threads before moving to the next rank.
    pub fn partition(&self, ordinal: u32) -> RankInfo {
        RankInfo::new(ordinal / self.threads, ordinal % self.threads)
    }

    pub fn contains(&self, r: RankInfo) -> bool {
        r.rank < self.ranks && r.thread < self.threads
    }
}

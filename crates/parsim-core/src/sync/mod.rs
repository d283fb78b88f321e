//! # parsim-core::sync
//!
//! Synchronization across partitions. One [`SyncManager`] exists per thread;
//! exactly one [`rank::RankSync`] is shared across all threads of a process.
//! The manager tracks the next rank and thread epochs and decides which
//! protocol a popped Sync activity runs; the epoch choreography itself lives
//! in the scheduler, which owns the vortex the epochs feed.

pub mod barrier;
pub mod queue;
pub mod rank;
pub mod thread;

use crate::sync::{barrier::Barrier, rank::RankSync, thread::ThreadSync};
use crate::transport::Transport;
use parsim_types::{
    id::{RankInfo, WorldShape},
    time::{SimTime, MAX_SIM_TIME},
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64};
use std::sync::Arc;
use std::time::Duration;

/// Which protocol the next popped Sync activity runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncType {
    Rank,
    Thread,
}

/// State shared by all threads of one process. The barrier arrays mirror
/// the epoch choreography: five stations for a rank epoch, three for an
/// untimed exchange.
pub struct ProcessShared {
    pub exec_barriers: [Barrier; 5],
    pub untimed_barriers: [Barrier; 3],
    /// Stations for the end-of-simulation check that rides each epoch.
    pub exit_barriers: [Barrier; 2],
    /// Per-thread primary-component counts, updated by the owning scheduler.
    pub thread_primaries: Vec<AtomicU64>,
    /// Per-thread local end-of-simulation times.
    pub thread_end_cycles: Vec<AtomicU64>,
    /// Set once the global primary count reached zero.
    pub end_flag: AtomicBool,
    pub global_end_cycle: AtomicU64,
    /// Set when an end signal was observed during a sync round.
    pub abort_flag: AtomicBool,
    /// Merged USR flag for the round: 0 none, 1 USR1, 2 USR2.
    pub sig_usr: AtomicU32,
    pub sig_alrm: AtomicBool,
    /// Untimed messages sent this phase, summed over local threads.
    pub untimed_sent: AtomicU64,
    /// Result of the per-phase global untimed-count reduction.
    pub untimed_global: AtomicU64,
}

impl ProcessShared {
    pub fn new(threads: u32, barrier_timeout: Duration) -> Arc<ProcessShared> {
        let n = threads as usize;
        let mk = || Barrier::new(n, barrier_timeout);
        Arc::new(ProcessShared {
            exec_barriers: [mk(), mk(), mk(), mk(), mk()],
            untimed_barriers: [mk(), mk(), mk()],
            exit_barriers: [mk(), mk()],
            thread_primaries: (0..n).map(|_| AtomicU64::new(0)).collect(),
            thread_end_cycles: (0..n).map(|_| AtomicU64::new(0)).collect(),
            end_flag: AtomicBool::new(false),
            global_end_cycle: AtomicU64::new(0),
            abort_flag: AtomicBool::new(false),
            sig_usr: AtomicU32::new(0),
            sig_alrm: AtomicBool::new(false),
            untimed_sent: AtomicU64::new(0),
            untimed_global: AtomicU64::new(0),
        })
    }
}

/// Per-thread sync bookkeeping.
pub struct SyncManager {
    pub rank: RankInfo,
    pub world: WorldShape,
    /// Cycles between rank epochs; `MAX_SIM_TIME` when this is a
    /// single-rank world.
    pub rank_period: SimTime,
    /// Cycles between thread-only epochs; `MAX_SIM_TIME` when unneeded.
    pub thread_period: SimTime,
    pub next_rank_sync: SimTime,
    pub next_thread_sync: SimTime,
    pub next_type: SyncType,
    pub thread_sync: ThreadSync,
    pub rank_sync: Arc<RankSync>,
    pub shared: Arc<ProcessShared>,
    pub transport: Arc<dyn Transport>,
}

impl SyncManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rank: RankInfo,
        world: WorldShape,
        rank_period: SimTime,
        thread_period: SimTime,
        thread_sync: ThreadSync,
        rank_sync: Arc<RankSync>,
        shared: Arc<ProcessShared>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            rank,
            world,
            rank_period,
            thread_period,
            next_rank_sync: rank_period,
            next_thread_sync: thread_period,
            next_type: SyncType::Thread,
            thread_sync,
            rank_sync,
            shared,
            transport,
        }
    }

    /// Advances whichever epoch just ran and returns the delivery time of
    /// the next Sync activity, recording its type. A rank sync wins ties so
    /// the global checks are never starved.
    pub fn compute_next(&mut self, now: SimTime) -> SimTime {
        if self.next_rank_sync <= now && self.rank_period != MAX_SIM_TIME {
            self.next_rank_sync = now.saturating_add(self.rank_period);
        }
        if self.next_thread_sync <= now && self.thread_period != MAX_SIM_TIME {
            self.next_thread_sync = now.saturating_add(self.thread_period);
        }
        if self.next_rank_sync <= self.next_thread_sync {
            self.next_type = SyncType::Rank;
            self.next_rank_sync
        } else {
            self.next_type = SyncType::Thread;
            self.next_thread_sync
        }
    }
}

/// Derives the epoch periods for a partition.
///
/// Open-question resolution: a multi-rank world with no cross-rank links
/// still rank-syncs at `exit_check` so global termination never depends on
/// link topology. Likewise a multi-thread single-rank world with no
/// cross-thread links thread-syncs at `exit_check`.
pub fn epoch_periods(
    world: WorldShape,
    min_part: SimTime,
    interthread_min: SimTime,
    exit_check: SimTime,
) -> (SimTime, SimTime) {
    let rank_period = if world.ranks > 1 {
        if min_part != MAX_SIM_TIME {
            min_part
        } else {
            exit_check
        }
    } else {
        MAX_SIM_TIME
    };
    let thread_period = if world.threads > 1 {
        if interthread_min != MAX_SIM_TIME {
            interthread_min
        } else if world.ranks == 1 {
            exit_check
        } else {
            // Rank epochs already force a full thread flush.
            MAX_SIM_TIME
        }
    } else {
        MAX_SIM_TIME
    };
    (rank_period, thread_period)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_fall_back_to_exit_check() {
        let w = WorldShape::new(2, 1);
        assert_eq!(epoch_periods(w, MAX_SIM_TIME, MAX_SIM_TIME, 100), (100, MAX_SIM_TIME));
        assert_eq!(epoch_periods(w, 7, MAX_SIM_TIME, 100), (7, MAX_SIM_TIME));

        let w = WorldShape::new(1, 2);
        assert_eq!(epoch_periods(w, MAX_SIM_TIME, 9, 100), (MAX_SIM_TIME, 9));
        assert_eq!(
            epoch_periods(w, MAX_SIM_TIME, MAX_SIM_TIME, 100),
            (MAX_SIM_TIME, 100)
        );
    }
}

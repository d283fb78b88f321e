//! # parsim-core::activity
//!
//! The `Activity` enum and the `Queued` wrapper stored in the TimeVortex.
//! An activity record carries only the key needed to dispatch it; the heavy
//! state (clock handler lists, the sync manager) lives in the scheduler and
//! is looked up when the record pops.

use crate::event::Event;
use parsim_types::time::SimTime;
use std::cmp::Ordering;

/// Priority bands. Lower values dispatch first at equal delivery time.
pub const SYNC_PRIORITY: i32 = -100;
pub const CLOCK_PRIORITY: i32 = -50;
pub const EVENT_PRIORITY: i32 = 0;
pub const EXIT_PRIORITY: i32 = 50;
pub const STOP_PRIORITY: i32 = 100;

/// Everything that can be scheduled in a TimeVortex.
#[derive(Debug)]
pub enum Activity {
    /// Deliver an event to the link identified by its `delivery_info`.
    Event(Event),
    /// Tick the clock registered under this period factor.
    Clock { factor: SimTime },
    /// Run a sync round; the scheduler's SyncManager decides RANK vs THREAD.
    Sync,
    /// Check the primary-component count and stop if it reached zero.
    Exit,
    /// Unconditionally end the simulation.
    Stop { message: Option<String> },
    /// Log simulated-time progress and reschedule.
    Heartbeat { period: SimTime },
}

/// An activity with its scheduling key. The vortex orders by the
/// lexicographic tuple `(time, priority, seq)`; `seq` is stamped at insert
/// and makes the order total and deterministic.
#[derive(Debug)]
pub struct Queued {
    pub time: SimTime,
    pub priority: i32,
    pub seq: u64,
    pub activity: Activity,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    /// `BinaryHeap` is a max-heap, so the ordering is reversed to pop the
    /// minimum `(time, priority, seq)` first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(time: SimTime, priority: i32, seq: u64) -> Queued {
        Queued {
            time,
            priority,
            seq,
            activity: Activity::Sync,
        }
    }

    #[test]
    fn orders_by_time_then_priority_then_seq() {
        let mut heap = std::collections::BinaryHeap::new();
        heap.push(q(10, STOP_PRIORITY, 0));
        heap.push(q(10, EVENT_PRIORITY, 1));
        heap.push(q(5, STOP_PRIORITY, 2));
        heap.push(q(10, EVENT_PRIORITY, 3));

        let order: Vec<(SimTime, i32, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.time, e.priority, e.seq))
            .collect();
        assert_eq!(
            order,
            vec![
                (5, STOP_PRIORITY, 2),
                (10, EVENT_PRIORITY, 1),
                (10, EVENT_PRIORITY, 3),
                (10, STOP_PRIORITY, 0),
            ]
        );
    }
}

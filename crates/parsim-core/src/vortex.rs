//! # parsim-core::vortex
//!
//! The TimeVortex: the per-thread priority queue of activities, ordered by
//! `(delivery_time, priority, insertion_order)`. Insertion order is stamped
//! at the instant of insert, which makes the order total and deterministic
//! for a given sequence of inserts.

use crate::activity::{Activity, Queued};
use parsim_types::{errors::SimError, time::SimTime};
use std::collections::BinaryHeap;

pub struct TimeVortex {
    heap: BinaryHeap<Queued>,
    insert_seq: u64,
    last_popped: SimTime,
}

impl TimeVortex {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            insert_seq: 0,
            last_popped: 0,
        }
    }

    /// Inserts an activity for delivery at `time` with the given priority.
    pub fn insert(&mut self, time: SimTime, priority: i32, activity: Activity) {
        let seq = self.insert_seq;
        self.insert_seq += 1;
        self.heap.push(Queued {
            time,
            priority,
            seq,
            activity,
        });
    }

    /// Pops the activity with the minimum ordering key. Popping from an
    /// empty vortex is a programming error: the run loop seeds a guard stop
    /// action at `MAX_SIM_TIME` so this is unreachable during Run.
    pub fn pop(&mut self) -> Result<Queued, SimError> {
        let q = self.heap.pop().ok_or(SimError::EmptyVortex)?;
        debug_assert!(q.time >= self.last_popped, "time went backwards");
        self.last_popped = q.time;
        Ok(q)
    }

    /// Delivery time and priority of the front activity without removing it.
    pub fn front(&self) -> Option<(SimTime, i32)> {
        self.heap.peek().map(|q| (q.time, q.priority))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for TimeVortex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{EVENT_PRIORITY, STOP_PRIORITY, SYNC_PRIORITY};

    #[test]
    fn pops_in_nondecreasing_key_order() {
        // A fixed scramble of (time, priority) pairs; pops must come out
        // sorted by (time, priority, insertion order).
        let inserts = [
            (30u64, EVENT_PRIORITY),
            (10, STOP_PRIORITY),
            (10, EVENT_PRIORITY),
            (20, SYNC_PRIORITY),
            (10, EVENT_PRIORITY),
            (30, SYNC_PRIORITY),
            (20, EVENT_PRIORITY),
            (10, SYNC_PRIORITY),
        ];
        let mut vortex = TimeVortex::new();
        for (t, p) in inserts {
            vortex.insert(t, p, Activity::Sync);
        }

        let mut popped = Vec::new();
        while !vortex.is_empty() {
            let q = vortex.pop().unwrap();
            popped.push((q.time, q.priority, q.seq));
        }
        let mut sorted = popped.clone();
        sorted.sort();
        assert_eq!(popped, sorted);
        // Equal (time, priority) pairs keep insertion order.
        assert_eq!(popped[1], (10, EVENT_PRIORITY, 2));
        assert_eq!(popped[2], (10, EVENT_PRIORITY, 4));
    }

    #[test]
    fn empty_pop_is_an_error() {
        let mut vortex = TimeVortex::new();
        assert!(matches!(vortex.pop(), Err(SimError::EmptyVortex)));
    }

    #[test]
    fn front_does_not_remove() {
        let mut vortex = TimeVortex::new();
        vortex.insert(5, EVENT_PRIORITY, Activity::Sync);
        assert_eq!(vortex.front(), Some((5, EVENT_PRIORITY)));
        assert_eq!(vortex.len(), 1);
    }
}

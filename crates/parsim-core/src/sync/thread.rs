//! # parsim-core::sync::thread
//!
//! Intra-process synchronization: the per-thread view of the thread-sync
//! queues. Producers publish into their SPSC channel during Run; at an
//! epoch, after the barrier has quiesced all producers, the owning thread
//! drains its inboxes in producer order, which makes the merge order
//! deterministic for a given run.

use crate::event::Event;
use crate::sync::queue::ThreadInboxes;

pub struct ThreadSync {
    pub thread: u32,
    inboxes: ThreadInboxes,
    /// Events pulled from peer threads at the last drain.
    pub drained: u64,
}

impl ThreadSync {
    pub fn new(thread: u32, inboxes: ThreadInboxes) -> Self {
        Self {
            thread,
            inboxes,
            drained: 0,
        }
    }

    /// Drains all timed inboxes, producer threads in ascending order.
    /// Only call between the flush and release barriers of an epoch.
    pub fn drain_timed(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for rx in &self.inboxes.timed {
            while let Ok(ev) = rx.try_recv() {
                events.push(ev);
            }
        }
        self.drained += events.len() as u64;
        events
    }

    /// Drains all untimed inboxes (init/complete phases).
    pub fn drain_untimed(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for rx in &self.inboxes.untimed {
            while let Ok(ev) = rx.try_recv() {
                events.push(ev);
            }
        }
        events
    }
}

//! # parsim-core::sync::queue
//!
//! The queues the sync layer drains at epoch boundaries. Thread-sync queues
//! are single-producer single-consumer channels, one per producing thread;
//! no lock is needed because the consumer only drains under a barrier.
//! Rank-sync queues aggregate all local threads' outbound events per
//! destination rank and are drained by thread 0 inside the rank-sync
//! critical section.

use crate::event::Event;
use crate::link::RankQueue;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Inbound thread-sync channels for one thread: index = producing thread.
/// The slot for the owning thread itself is a dormant channel, kept so
/// indexing stays direct.
pub struct ThreadInboxes {
    pub timed: Vec<Receiver<Event>>,
    pub untimed: Vec<Receiver<Event>>,
}

/// The full mesh of per-(producer, consumer) channels for one process,
/// created before threads spawn. `senders[p][c]` is handed out to links on
/// thread `p` whose pair lives on thread `c`.
pub struct ThreadMesh {
    pub timed_senders: Vec<Vec<Sender<Event>>>,
    pub untimed_senders: Vec<Vec<Sender<Event>>>,
    pub inboxes: Vec<Option<ThreadInboxes>>,
}

impl ThreadMesh {
    pub fn new(threads: u32) -> Self {
        let n = threads as usize;
        let mut timed_senders = vec![Vec::with_capacity(n); n];
        let mut untimed_senders = vec![Vec::with_capacity(n); n];
        let mut timed_rx: Vec<Vec<Receiver<Event>>> = vec![Vec::with_capacity(n); n];
        let mut untimed_rx: Vec<Vec<Receiver<Event>>> = vec![Vec::with_capacity(n); n];
        for p in 0..n {
            for c in 0..n {
                let (tx, rx) = unbounded();
                timed_senders[p].push(tx);
                timed_rx[c].push(rx);
                let (utx, urx) = unbounded();
                untimed_senders[p].push(utx);
                untimed_rx[c].push(urx);
            }
        }
        // Receivers were pushed in producer order per consumer.
        let inboxes = timed_rx
            .into_iter()
            .zip(untimed_rx)
            .map(|(timed, untimed)| Some(ThreadInboxes { timed, untimed }))
            .collect();
        Self {
            timed_senders,
            untimed_senders,
            inboxes,
        }
    }
}

/// Shared per-process rank-sync queues: one outbound vector per destination
/// rank (the self slot stays empty), for timed and untimed traffic.
pub struct RankQueues {
    pub timed: Vec<RankQueue>,
    pub untimed: Vec<RankQueue>,
}

impl RankQueues {
    pub fn new(ranks: u32) -> Arc<RankQueues> {
        Arc::new(RankQueues {
            timed: (0..ranks).map(|_| Arc::new(Mutex::new(Vec::new()))).collect(),
            untimed: (0..ranks)
                .map(|_| Arc::new(Mutex::new(Vec::new())))
                .collect(),
        })
    }

    /// Takes everything queued for `dst`, leaving the queue empty.
    pub fn take_timed(&self, dst: u32) -> Vec<Event> {
        std::mem::take(&mut *self.timed[dst as usize].lock().expect("rank queue poisoned"))
    }

    pub fn take_untimed(&self, dst: u32) -> Vec<Event> {
        std::mem::take(&mut *self.untimed[dst as usize].lock().expect("rank queue poisoned"))
    }
}

//! # parsim-core::sync::rank
//!
//! Cross-rank synchronization. Exactly one RankSync exists per process; all
//! of its work happens on thread 0 inside the barrier-protected critical
//! section of a rank epoch: drain the per-destination queues, exchange
//! serialized blocks with the peers, route received events to the owning
//! threads, and reduce signal flags and the end-of-simulation predicate.

use crate::event::{
    decode_event_block, decode_link_info, encode_event_block, encode_link_info, unpack_cookie,
    Event,
};
use crate::sync::queue::RankQueues;
use crate::transport::Transport;
use bytes::Bytes;
use parsim_types::errors::SimError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Per-process cross-rank sync state. Shared by all threads; only thread 0
/// touches the transport.
pub struct RankSync {
    pub queues: Arc<RankQueues>,
    /// Events received from peers, routed per owning thread. Filled by
    /// thread 0, drained by each thread after the release barrier.
    pub inbound: Vec<Mutex<Vec<Event>>>,
    pub untimed_inbound: Vec<Mutex<Vec<Event>>>,
    /// Conservation counters for the last epoch (testable property: events
    /// out before an epoch == events inserted as a result of it).
    pub sent_total: AtomicU64,
    pub received_total: AtomicU64,
    /// Outbound link-info advertisements, per destination rank. Consumed by
    /// [`RankSync::exchange_link_info`].
    pub link_info: Mutex<Vec<Vec<(String, u64)>>>,
}

impl RankSync {
    pub fn new(ranks: u32, threads: u32) -> Arc<RankSync> {
        Arc::new(RankSync {
            queues: RankQueues::new(ranks),
            inbound: (0..threads).map(|_| Mutex::new(Vec::new())).collect(),
            untimed_inbound: (0..threads).map(|_| Mutex::new(Vec::new())).collect(),
            sent_total: AtomicU64::new(0),
            received_total: AtomicU64::new(0),
            link_info: Mutex::new(Vec::new()),
        })
    }

    /// The timed event exchange of one rank epoch. Thread 0 only.
    pub fn exchange_timed(&self, transport: &dyn Transport) -> Result<(), SimError> {
        self.exchange_inner(transport, false)
    }

    /// The untimed exchange of one init/complete phase. Thread 0 only.
    pub fn exchange_untimed(&self, transport: &dyn Transport) -> Result<(), SimError> {
        self.exchange_inner(transport, true)
    }

    fn exchange_inner(&self, transport: &dyn Transport, untimed: bool) -> Result<(), SimError> {
        let me = transport.my_rank();
        let mut outbound = Vec::new();
        for dst in 0..transport.num_ranks() {
            if dst == me {
                continue;
            }
            let events = if untimed {
                self.queues.take_untimed(dst)
            } else {
                self.queues.take_timed(dst)
            };
            if !untimed {
                self.sent_total.fetch_add(events.len() as u64, Ordering::Relaxed);
            }
            outbound.push((dst, encode_event_block(&events)));
        }

        let inbound = transport.exchange(outbound)?;
        for (_src, block) in inbound {
            let events = decode_event_block(block)?;
            if !untimed {
                self.received_total
                    .fetch_add(events.len() as u64, Ordering::Relaxed);
            }
            metrics::counter!("parsim_rank_events_received").increment(events.len() as u64);
            for ev in events {
                let (thread, _) = unpack_cookie(ev.delivery_info);
                let slot = if untimed {
                    &self.untimed_inbound[thread as usize]
                } else {
                    &self.inbound[thread as usize]
                };
                slot.lock().expect("rank inbound poisoned").push(ev);
            }
        }
        Ok(())
    }

    /// Takes the events routed to `thread` at the last epoch.
    pub fn take_inbound(&self, thread: u32) -> Vec<Event> {
        std::mem::take(
            &mut *self.inbound[thread as usize]
                .lock()
                .expect("rank inbound poisoned"),
        )
    }

    pub fn take_untimed_inbound(&self, thread: u32) -> Vec<Event> {
        std::mem::take(
            &mut *self.untimed_inbound[thread as usize]
                .lock()
                .expect("rank inbound poisoned"),
        )
    }

    /// Records an advertisement `(link_name, cookie)` for the peer rank.
    /// Returns an error when the same name is advertised twice to one peer.
    pub fn advertise_link(
        &self,
        ranks: u32,
        dst: u32,
        name: String,
        cookie: u64,
    ) -> Result<(), SimError> {
        let mut info = self.link_info.lock().expect("link info poisoned");
        if info.is_empty() {
            info.resize_with(ranks as usize, Vec::new);
        }
        let slot = &mut info[dst as usize];
        if slot.iter().any(|(n, _)| n == &name) {
            return Err(SimError::CookieCollision(name));
        }
        slot.push((name, cookie));
        Ok(())
    }

    /// Pairwise exchange of `(link_name, delivery_info)` tuples after
    /// wire-up. Returns the peers' advertisements; the caller matches them
    /// by name onto its shadow halves. Unmatched names are the caller's to
    /// warn about (asymmetric topologies are legal).
    pub fn exchange_link_info(
        &self,
        transport: &dyn Transport,
    ) -> Result<Vec<(String, u64)>, SimError> {
        let me = transport.my_rank();
        let info = {
            let mut guard = self.link_info.lock().expect("link info poisoned");
            if guard.is_empty() {
                guard.resize_with(transport.num_ranks() as usize, Vec::new);
            }
            guard.clone()
        };
        let outbound: Vec<(u32, Bytes)> = (0..transport.num_ranks())
            .filter(|r| *r != me)
            .map(|r| (r, encode_link_info(&info[r as usize])))
            .collect();
        let mut received = Vec::new();
        for (_, block) in transport.exchange(outbound)? {
            received.extend(decode_link_info(block)?);
        }
        Ok(received)
    }
}

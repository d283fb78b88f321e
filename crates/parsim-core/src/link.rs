//! # parsim-core::link
//!
//! Links: the only mechanism by which components exchange events. The two
//! halves of a logical edge live in per-thread arenas (`Vec<Link>`); a
//! `LinkId` is an index and the pair reference is an index, which keeps the
//! mutually-referencing pair ownership acyclic. For a cross-partition edge
//! the local arena holds the local half plus a shadow of the remote half
//! whose receive queue routes into the sync layer.

use crate::{event::Event, timelord::TimeConverter};
use bytes::Bytes;
use crossbeam_channel::Sender;
use fxhash::FxHashMap;
use parsim_types::{
    errors::SimError,
    id::{ComponentId, LinkId, LINK_UNPAIRED},
    time::SimTime,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A shared outbound queue for one remote rank, drained by thread 0 at each
/// rank sync epoch.
pub type RankQueue = Arc<Mutex<Vec<Event>>>;

/// Where `send` on the paired half deposits events. The untimed channel is
/// distinct so init/complete traffic never interleaves with timed events.
#[derive(Clone)]
pub enum RecvQueue {
    /// Wire-up has not completed for this half.
    Unconfigured,
    /// Same-thread edge: straight into the local TimeVortex.
    LocalVortex,
    /// Same-rank, different-thread edge: the receiving thread's inboxes.
    ThreadSync {
        timed: Sender<Event>,
        untimed: Sender<Event>,
    },
    /// Cross-rank edge: the outbound queues for the destination rank.
    RankSync {
        dst_rank: u32,
        timed: RankQueue,
        untimed: RankQueue,
    },
}

impl std::fmt::Debug for RecvQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvQueue::Unconfigured => write!(f, "Unconfigured"),
            RecvQueue::LocalVortex => write!(f, "LocalVortex"),
            RecvQueue::ThreadSync { .. } => write!(f, "ThreadSync"),
            RecvQueue::RankSync { dst_rank, .. } => write!(f, "RankSync({dst_rank})"),
        }
    }
}

/// One half of a logical edge.
#[derive(Debug)]
pub struct Link {
    pub id: LinkId,
    /// The configured link name; used for cross-rank cookie matching.
    pub name: String,
    /// Arena index of the opposite half.
    pub pair: LinkId,
    /// Latency added to every send on this half, in core cycles.
    pub latency: SimTime,
    /// Units for bare numeric delays passed to `send`.
    pub default_tc: TimeConverter,
    /// Cookie identifying this half to its receiver's dispatcher. For local
    /// halves this is the own arena index; for a cross-rank shadow it is the
    /// peer's cookie, learned in the post-wire-up exchange.
    pub delivery_info: u64,
    /// The local component this half belongs to (for sub-components, the
    /// owning parent).
    pub owner: ComponentId,
    /// Push-style delivery target. Absent means the link is polled.
    pub handler: Option<ComponentId>,
    pub queue: RecvQueue,
    /// Set once wire-up (including the cross-rank cookie exchange) is done.
    pub configured: bool,
    /// Set by prepare-for-complete; sends fail afterwards.
    pub closed: bool,
    /// Delivered events awaiting `recv` on a polled link.
    pub poll_buf: VecDeque<Event>,
    /// Untimed data delivered during init/complete phases.
    pub untimed_buf: VecDeque<Bytes>,
}

impl Link {
    pub fn new(id: LinkId, name: String, default_tc: TimeConverter) -> Self {
        Self {
            id,
            name,
            pair: LINK_UNPAIRED,
            latency: 0,
            default_tc,
            delivery_info: 0,
            owner: 0,
            handler: None,
            queue: RecvQueue::Unconfigured,
            configured: false,
            closed: false,
            poll_buf: VecDeque::new(),
            untimed_buf: VecDeque::new(),
        }
    }

    /// Guard used by every send path.
    pub fn check_sendable(&self) -> Result<(), SimError> {
        if self.closed {
            return Err(SimError::LinkClosed(self.id));
        }
        if !self.configured {
            return Err(SimError::LinkUnconfigured(self.id));
        }
        Ok(())
    }
}

/// Factory for the two halves of one logical edge. The halves reference
/// each other by arena index, so `links[l.pair].pair == l.id` holds on both
/// sides by construction.
pub struct LinkPair;

impl LinkPair {
    /// Builds a mutually-referencing pair destined for arena slots `base`
    /// and `base + 1`. Each half's delivery cookie starts as its own index;
    /// wire-up overrides it for halves that shadow a remote end.
    pub fn build(base: LinkId, name: &str, tc: TimeConverter) -> (Link, Link) {
        let mut left = Link::new(base, name.to_string(), tc);
        let mut right = Link::new(base + 1, name.to_string(), tc);
        left.pair = base + 1;
        right.pair = base;
        left.delivery_info = base as u64;
        right.delivery_info = (base + 1) as u64;
        (left, right)
    }
}

/// Port name to arena index, one per component. Built during wire-up and
/// handed to the component at construction.
#[derive(Clone, Debug, Default)]
pub struct LinkMap {
    ports: FxHashMap<String, LinkId>,
}

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, port: impl Into<String>, link: LinkId) {
        self.ports.insert(port.into(), link);
    }

    pub fn get(&self, port: &str) -> Option<LinkId> {
        self.ports.get(port).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, LinkId)> {
        self.ports.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timelord::TimeLord;

    #[test]
    fn sends_are_guarded_by_lifecycle() {
        let lord = TimeLord::new("1ps").unwrap();
        let mut link = Link::new(0, "l".into(), lord.raw(1));
        assert!(matches!(
            link.check_sendable(),
            Err(SimError::LinkUnconfigured(0))
        ));
        link.configured = true;
        assert!(link.check_sendable().is_ok());
        link.closed = true;
        assert!(matches!(link.check_sendable(), Err(SimError::LinkClosed(0))));
    }

    #[test]
    fn pair_halves_reference_each_other() {
        let lord = TimeLord::new("1ps").unwrap();
        let (left, right) = LinkPair::build(6, "edge", lord.raw(1));
        assert_eq!(left.id, 6);
        assert_eq!(right.id, 7);
        assert_eq!(left.pair, right.id);
        assert_eq!(right.pair, left.id);
        assert_eq!(left.delivery_info, 6);
    }

    #[test]
    fn link_map_resolves_ports() {
        let mut lm = LinkMap::new();
        lm.insert("north", 3);
        assert_eq!(lm.get("north"), Some(3));
        assert_eq!(lm.get("south"), None);
    }
}

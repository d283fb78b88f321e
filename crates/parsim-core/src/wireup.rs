//! # parsim-core::wireup
//!
//! Materializes a partitioned ConfigGraph into per-thread link arenas,
//! link maps, and component build lists for one process. Links are
//! processed once, in id order, so link construction is deterministic;
//! the graph is consumed destructively so peak memory stays bounded.
//!
//! The four cases per link: both endpoints remote (skip), same partition
//! (both halves local, vortex delivery), same rank across threads (each
//! side gets a shadow of the other wired to the thread-sync channel), and
//! cross rank (local half plus a shadow wired to the rank-sync queue whose
//! delivery cookie arrives in the post-wire-up exchange).

use crate::{
    event::pack_cookie,
    link::{Link, LinkMap, LinkPair, RecvQueue},
    sync::{
        queue::{ThreadInboxes, ThreadMesh},
        rank::RankSync,
    },
    timelord::TimeLord,
    transport::Transport,
};
use fxhash::FxHashMap;
use parsim_types::{
    config::{ConfigGraph, ConfigLinkEndpoint},
    errors::{ConfigError, SimError},
    id::{parent_id, ComponentId, LinkId, RankInfo, WorldShape},
    time::{SimTime, TimeQuantity, MAX_SIM_TIME},
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireUpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Everything one scheduler thread needs to come alive.
pub struct ThreadSeed {
    pub thread: u32,
    pub links: Vec<Link>,
    pub link_maps: FxHashMap<ComponentId, LinkMap>,
    /// Components to build, in id order.
    pub components: Vec<parsim_types::config::ConfigComponent>,
    pub inboxes: Option<ThreadInboxes>,
    /// Shadow halves awaiting the peer's delivery cookie, by link name.
    pub pending_cookies: FxHashMap<String, LinkId>,
}

/// The wire-up result for one process.
pub struct RankWiring {
    pub seeds: Vec<ThreadSeed>,
    pub rank_sync: Arc<RankSync>,
    /// Minimum latency across all cross-rank links, in cycles. Global: every
    /// rank computes the same value from the same graph.
    pub min_part: SimTime,
    /// Minimum latency across this process's cross-thread links.
    pub interthread_min: SimTime,
}

fn latency_cycles(
    lord: &TimeLord,
    ep: &ConfigLinkEndpoint,
    link_name: &str,
) -> Result<SimTime, ConfigError> {
    let q = TimeQuantity::parse(&ep.latency)?;
    let cycles = q.attos / lord.base_attos();
    if cycles == 0 {
        return Err(ConfigError::SubCycleLatency(link_name.to_string()));
    }
    Ok(cycles as SimTime)
}

pub fn wire_up(
    mut graph: ConfigGraph,
    my_rank: u32,
    world: WorldShape,
    lord: &TimeLord,
) -> Result<RankWiring, WireUpError> {
    let mesh = ThreadMesh::new(world.threads);
    let ThreadMesh {
        timed_senders,
        untimed_senders,
        mut inboxes,
    } = mesh;
    let rank_sync = RankSync::new(world.ranks, world.threads);

    let mut seeds: Vec<ThreadSeed> = (0..world.threads)
        .map(|t| ThreadSeed {
            thread: t,
            links: Vec::new(),
            link_maps: FxHashMap::default(),
            components: Vec::new(),
            inboxes: inboxes[t as usize].take(),
            pending_cookies: FxHashMap::default(),
        })
        .collect();

    let partition_of = |graph: &ConfigGraph, comp: ComponentId| -> RankInfo {
        graph
            .component(comp)
            .and_then(|c| c.rank)
            .expect("wire-up requires a fully partitioned graph")
    };

    // The skew bounds. min_part spans the whole graph (every rank must agree
    // on the rank epoch cadence); interthread_min only this process.
    let mut min_part = MAX_SIM_TIME;
    let mut interthread_min = MAX_SIM_TIME;
    for link in &graph.links {
        let (a, b) = match &link.endpoints {
            [Some(a), Some(b)] => (a, b),
            _ => continue,
        };
        let ra = partition_of(&graph, a.component);
        let rb = partition_of(&graph, b.component);
        if ra == rb {
            continue;
        }
        let la = latency_cycles(lord, a, &link.name)?;
        let lb = latency_cycles(lord, b, &link.name)?;
        if ra.rank != rb.rank {
            min_part = min_part.min(la).min(lb);
        } else if ra.rank == my_rank {
            interthread_min = interthread_min.min(la).min(lb);
        }
    }

    // Materialize links in id order.
    let links = std::mem::take(&mut graph.links);
    for link in links {
        let (a, b) = match &link.endpoints {
            [Some(a), Some(b)] => (a.clone(), b.clone()),
            _ => continue,
        };
        let ra = partition_of(&graph, a.component);
        let rb = partition_of(&graph, b.component);

        if ra.rank != my_rank && rb.rank != my_rank {
            continue;
        }

        let lat_a = latency_cycles(lord, &a, &link.name)?;
        let lat_b = latency_cycles(lord, &b, &link.name)?;

        if ra == rb {
            // Same partition: both halves share the thread's arena.
            let seed = &mut seeds[ra.thread as usize];
            let ia = seed.links.len();
            let (mut half_a, mut half_b) = LinkPair::build(ia, &link.name, lord.raw(1));
            half_a.latency = lat_a;
            half_a.owner = parent_id(a.component);
            half_a.queue = RecvQueue::LocalVortex;
            half_a.configured = true;
            half_b.latency = lat_b;
            half_b.owner = parent_id(b.component);
            half_b.queue = RecvQueue::LocalVortex;
            half_b.configured = true;
            seed.links.push(half_a);
            seed.links.push(half_b);
            insert_port(&graph, seed, a.component, &a.port, ia);
            insert_port(&graph, seed, b.component, &b.port, ia + 1);
        } else if ra.rank == rb.rank {
            // Same rank, different threads: each side gets its real half
            // plus a shadow of the opposite half wired to the thread mesh.
            // Both arenas are local to this process, so the shadow's cookie
            // is simply the real half's index on its owning thread.
            let (ta, tb) = (ra.thread as usize, rb.thread as usize);
            let ia = seeds[ta].links.len();
            let ib = seeds[tb].links.len();

            let (mut real_a, mut shadow_b) = LinkPair::build(ia, &link.name, lord.raw(1));
            real_a.latency = lat_a;
            real_a.owner = parent_id(a.component);
            real_a.queue = RecvQueue::LocalVortex;
            real_a.configured = true;
            shadow_b.owner = parent_id(b.component);
            shadow_b.delivery_info = ib as u64;
            shadow_b.queue = RecvQueue::ThreadSync {
                timed: timed_senders[ta][tb].clone(),
                untimed: untimed_senders[ta][tb].clone(),
            };
            shadow_b.configured = true;
            seeds[ta].links.push(real_a);
            seeds[ta].links.push(shadow_b);
            insert_port(&graph, &mut seeds[ta], a.component, &a.port, ia);

            let (mut real_b, mut shadow_a) = LinkPair::build(ib, &link.name, lord.raw(1));
            real_b.latency = lat_b;
            real_b.owner = parent_id(b.component);
            real_b.queue = RecvQueue::LocalVortex;
            real_b.configured = true;
            shadow_a.owner = parent_id(a.component);
            shadow_a.delivery_info = ia as u64;
            shadow_a.queue = RecvQueue::ThreadSync {
                timed: timed_senders[tb][ta].clone(),
                untimed: untimed_senders[tb][ta].clone(),
            };
            shadow_a.configured = true;
            seeds[tb].links.push(real_b);
            seeds[tb].links.push(shadow_a);
            insert_port(&graph, &mut seeds[tb], b.component, &b.port, ib);
        } else {
            // Cross rank: the local half carries its full latency; the
            // shadow of the remote half routes into the rank-sync queue and
            // learns its delivery cookie in the post-wire-up exchange.
            let (local_ep, local_part, remote_part, local_lat) = if ra.rank == my_rank {
                (&a, ra, rb, lat_a)
            } else {
                (&b, rb, ra, lat_b)
            };
            let t = local_part.thread as usize;
            let seed = &mut seeds[t];
            let il = seed.links.len();
            let ir = il + 1;

            let (mut local_half, mut remote_shadow) = LinkPair::build(il, &link.name, lord.raw(1));
            local_half.latency = local_lat;
            local_half.owner = parent_id(local_ep.component);
            local_half.delivery_info = pack_cookie(local_part.thread, il);
            local_half.queue = RecvQueue::LocalVortex;
            local_half.configured = true;

            remote_shadow.delivery_info = 0;
            remote_shadow.queue = RecvQueue::RankSync {
                dst_rank: remote_part.rank,
                timed: Arc::clone(&rank_sync.queues.timed[remote_part.rank as usize]),
                untimed: Arc::clone(&rank_sync.queues.untimed[remote_part.rank as usize]),
            };
            // Not configured until the peer's cookie arrives.
            remote_shadow.configured = false;

            seed.links.push(local_half);
            seed.links.push(remote_shadow);
            seed.pending_cookies.insert(link.name.clone(), ir);
            insert_port(&graph, seed, local_ep.component, &local_ep.port, il);

            rank_sync.advertise_link(
                world.ranks,
                remote_part.rank,
                link.name.clone(),
                pack_cookie(local_part.thread, il),
            )?;
        }
    }

    // Now hand out the components. Remote entries are dropped here, which
    // caps peak memory during materialization.
    let components = std::mem::take(&mut graph.components);
    for comp in components {
        let rank = comp.rank.expect("wire-up requires a fully partitioned graph");
        if rank.rank != my_rank {
            continue;
        }
        let seed = &mut seeds[rank.thread as usize];
        if !seed.link_maps.contains_key(&comp.id) {
            tracing::warn!(component = %comp.name, "building component with no links assigned");
            seed.link_maps.insert(comp.id, LinkMap::new());
        }
        seed.components.push(comp);
    }

    Ok(RankWiring {
        seeds,
        rank_sync,
        min_part,
        interthread_min,
    })
}

/// Inserts a port mapping for an endpoint. Sub-component endpoints land in
/// the owning parent's map under `sub_name.port`.
fn insert_port(
    graph: &ConfigGraph,
    seed: &mut ThreadSeed,
    comp: ComponentId,
    port: &str,
    link: LinkId,
) {
    let owner = parent_id(comp);
    let key = if owner == comp {
        port.to_string()
    } else {
        let sub_name = graph
            .component(comp)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        format!("{sub_name}.{port}")
    };
    seed.link_maps.entry(owner).or_default().insert(key, link);
}

/// Runs the post-wire-up `(link_name, cookie)` exchange and patches the
/// pending shadow halves. Unmatched names warn on both sides; that can be a
/// legal asymmetric topology.
pub fn exchange_link_info(
    wiring: &mut RankWiring,
    transport: &dyn Transport,
) -> Result<(), SimError> {
    if transport.num_ranks() == 1 {
        return Ok(());
    }
    let received = wiring.rank_sync.exchange_link_info(transport)?;
    for (name, cookie) in received {
        let mut matched = false;
        for seed in wiring.seeds.iter_mut() {
            if let Some(idx) = seed.pending_cookies.remove(&name) {
                seed.links[idx].delivery_info = cookie;
                seed.links[idx].configured = true;
                matched = true;
                break;
            }
        }
        if !matched {
            tracing::warn!(link = %name, "unmatched link in rank link exchange");
        }
    }
    for seed in &wiring.seeds {
        for name in seed.pending_cookies.keys() {
            tracing::warn!(link = %name, "cross-rank link received no peer cookie");
        }
    }
    Ok(())
}

/// A JSON description of the wire-up result, for init-only runs.
pub fn describe(wiring: &RankWiring, my_rank: u32) -> serde_json::Value {
    let threads: Vec<serde_json::Value> = wiring
        .seeds
        .iter()
        .map(|seed| {
            serde_json::json!({
                "thread": seed.thread,
                "components": seed
                    .components
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "name": c.name,
                            "type": c.ty,
                        })
                    })
                    .collect::<Vec<_>>(),
                "links": seed
                    .links
                    .iter()
                    .map(|l| {
                        serde_json::json!({
                            "index": l.id,
                            "name": l.name,
                            "latency": l.latency,
                            "queue": format!("{:?}", l.queue),
                        })
                    })
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({
        "rank": my_rank,
        "min_part": wiring.min_part,
        "interthread_min": wiring.interthread_min,
        "threads": threads,
    })
}

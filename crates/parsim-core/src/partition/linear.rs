//! # parsim-core::partition::linear
//!
//! Deterministic linear partitioning: groups in id order, split across
//! partitions as evenly as possible, remainder spread over the first
//! partitions. Well suited to graphs that are roughly a chain.

use crate::partition::{graph::PartitionGraph, Partitioner};
use parsim_types::{config::ConfigGraph, errors::PartitionError, id::WorldShape};

pub struct LinearPartitioner;

impl Partitioner for LinearPartitioner {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn partition(&self, graph: &mut ConfigGraph, world: WorldShape) -> Result<(), PartitionError> {
        let pgraph = PartitionGraph::collapse(graph);
        let groups = pgraph.group_count();
        let slots = world.partitions() as usize;

        let per_slot = groups / slots;
        let remainder = groups % slots;
        tracing::debug!(groups, slots, per_slot, remainder, "linear partition scheme");

        let mut assignment = Vec::with_capacity(groups);
        let mut slot = 0usize;
        let mut on_slot = 0usize;
        for _ in 0..groups {
            assignment.push(slot.min(slots - 1) as u32);
            on_slot += 1;
            // The first `remainder` slots take one extra group.
            let quota = if slot < remainder { per_slot + 1 } else { per_slot };
            if on_slot >= quota.max(1) {
                on_slot = 0;
                slot += 1;
            }
        }

        pgraph.apply(graph, world, &assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::validate_assignment;
    use parsim_types::id::RankInfo;

    fn flat(n: usize) -> ConfigGraph {
        let mut g = ConfigGraph::new();
        for i in 0..n {
            g.add_component(format!("c{i}"), "t");
        }
        g
    }

    #[test]
    fn splits_evenly_with_remainder_up_front() {
        let mut g = flat(5);
        LinearPartitioner
            .partition(&mut g, WorldShape::new(2, 1))
            .unwrap();
        validate_assignment(&g, WorldShape::new(2, 1)).unwrap();
        let ranks: Vec<u32> = g.components.iter().map(|c| c.rank.unwrap().rank).collect();
        assert_eq!(ranks, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn fills_threads_before_ranks() {
        let mut g = flat(4);
        LinearPartitioner
            .partition(&mut g, WorldShape::new(2, 2))
            .unwrap();
        let parts: Vec<RankInfo> = g.components.iter().map(|c| c.rank.unwrap()).collect();
        assert_eq!(
            parts,
            vec![
                RankInfo::new(0, 0),
                RankInfo::new(0, 1),
                RankInfo::new(1, 0),
                RankInfo::new(1, 1),
            ]
        );
    }

    #[test]
    fn is_deterministic() {
        let mut a = flat(9);
        let mut b = flat(9);
        LinearPartitioner
            .partition(&mut a, WorldShape::new(3, 1))
            .unwrap();
        LinearPartitioner
            .partition(&mut b, WorldShape::new(3, 1))
            .unwrap();
        let ra: Vec<_> = a.components.iter().map(|c| c.rank).collect();
        let rb: Vec<_> = b.components.iter().map(|c| c.rank).collect();
        assert_eq!(ra, rb);
    }
}

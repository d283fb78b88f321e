//! # parsim-core::partition::round_robin
//!
//! Id-modulo-size assignment over the collapsed groups.

use crate::partition::{graph::PartitionGraph, Partitioner};
use parsim_types::{config::ConfigGraph, errors::PartitionError, id::WorldShape};

pub struct RoundRobinPartitioner;

impl Partitioner for RoundRobinPartitioner {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn partition(&self, graph: &mut ConfigGraph, world: WorldShape) -> Result<(), PartitionError> {
        let pgraph = PartitionGraph::collapse(graph);
        let slots = world.partitions();
        let assignment: Vec<u32> = (0..pgraph.group_count())
            .map(|i| (i as u32) % slots)
            .collect();
        pgraph.apply(graph, world, &assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternates_groups_across_partitions() {
        let mut g = ConfigGraph::new();
        for i in 0..4 {
            g.add_component(format!("c{i}"), "t");
        }
        RoundRobinPartitioner
            .partition(&mut g, WorldShape::new(2, 1))
            .unwrap();
        let ranks: Vec<u32> = g.components.iter().map(|c| c.rank.unwrap().rank).collect();
        assert_eq!(ranks, vec![0, 1, 0, 1]);
    }

    #[test]
    fn no_cut_groups_stay_together() {
        let mut g = ConfigGraph::new();
        let a = g.add_component("a", "t");
        let b = g.add_component("b", "t");
        g.add_component("c", "t");
        g.add_link(a, "ab", "p", "1ns");
        g.add_link(b, "ab", "p", "1ns");
        g.set_no_cut("ab", true);
        RoundRobinPartitioner
            .partition(&mut g, WorldShape::new(2, 1))
            .unwrap();
        crate::partition::validate_assignment(&g, WorldShape::new(2, 1)).unwrap();
        assert_eq!(
            g.components[0].rank,
            g.components[1].rank,
            "no_cut endpoints must share a partition"
        );
    }
}

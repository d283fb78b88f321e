//! # parsim-core::partition
//!
//! Partitioners assign every component a `(rank, thread)` pair before
//! wire-up. The built-in schemes are `single`, `linear`, and `round-robin`;
//! `external:<name>` delegates to a registered graph-partitioning engine
//! through [`graph::PartitionGraph`].

pub mod graph;
pub mod linear;
pub mod round_robin;

use crate::partition::graph::PartitionGraph;
use parsim_types::{
    config::ConfigGraph,
    errors::PartitionError,
    id::{RankInfo, WorldShape},
};
use std::sync::Arc;

pub trait Partitioner: Send + Sync {
    fn name(&self) -> &'static str;
    /// Writes a rank assignment into every component of the graph.
    fn partition(&self, graph: &mut ConfigGraph, world: WorldShape) -> Result<(), PartitionError>;
}

/// All components on partition (0, 0). Used when the world size is 1.
pub struct SinglePartitioner;

impl Partitioner for SinglePartitioner {
    fn name(&self) -> &'static str {
        "single"
    }

    fn partition(&self, graph: &mut ConfigGraph, _world: WorldShape) -> Result<(), PartitionError> {
        graph.set_all_ranks(RankInfo::new(0, 0));
        Ok(())
    }
}

/// The seam for external graph-partitioning libraries: the core presents a
/// weighted undirected graph and accepts back one partition ordinal per
/// group.
pub trait ExternalEngine: Send + Sync {
    fn assign(&self, graph: &PartitionGraph, partitions: u32) -> Result<Vec<u32>, String>;
}

pub struct ExternalPartitioner {
    label: &'static str,
    engine: Arc<dyn ExternalEngine>,
}

impl ExternalPartitioner {
    pub fn new(label: &'static str, engine: Arc<dyn ExternalEngine>) -> Self {
        Self { label, engine }
    }
}

impl Partitioner for ExternalPartitioner {
    fn name(&self) -> &'static str {
        self.label
    }

    fn partition(&self, graph: &mut ConfigGraph, world: WorldShape) -> Result<(), PartitionError> {
        let pgraph = PartitionGraph::collapse(graph);
        let assignment = self
            .engine
            .assign(&pgraph, world.partitions())
            .map_err(|e| PartitionError::External(self.label.to_string(), e))?;
        pgraph.apply(graph, world, &assignment)
    }
}

/// Name → partitioner lookup. `external:<name>` resolves through the
/// engines registered with [`PartitionerRegistry::register_external`].
pub struct PartitionerRegistry {
    builtin: Vec<Box<dyn Partitioner>>,
    external: Vec<(String, Arc<dyn ExternalEngine>)>,
}

impl PartitionerRegistry {
    pub fn standard() -> Self {
        Self {
            builtin: vec![
                Box::new(SinglePartitioner),
                Box::new(linear::LinearPartitioner),
                Box::new(round_robin::RoundRobinPartitioner),
            ],
            external: Vec::new(),
        }
    }

    pub fn register_external(&mut self, name: impl Into<String>, engine: Arc<dyn ExternalEngine>) {
        self.external.push((name.into(), engine));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtin.iter().map(|p| p.name().to_string()).collect();
        names.extend(self.external.iter().map(|(n, _)| format!("external:{n}")));
        names
    }

    pub fn lookup(&self, spec: &str) -> Result<Box<dyn Partitioner>, PartitionError> {
        if let Some(ext) = spec.strip_prefix("external:") {
            let engine = self
                .external
                .iter()
                .find(|(n, _)| n == ext)
                .map(|(_, e)| Arc::clone(e))
                .ok_or_else(|| PartitionError::UnknownPartitioner(spec.to_string()))?;
            return Ok(Box::new(ExternalPartitioner::new("external", engine)));
        }
        match spec {
            "single" => Ok(Box::new(SinglePartitioner)),
            "linear" => Ok(Box::new(linear::LinearPartitioner)),
            "round-robin" => Ok(Box::new(round_robin::RoundRobinPartitioner)),
            other => Err(PartitionError::UnknownPartitioner(other.to_string())),
        }
    }
}

/// Post-partition invariants: every component assigned, in range, and no
/// `no_cut` link spanning partitions.
pub fn validate_assignment(
    graph: &ConfigGraph,
    world: WorldShape,
) -> Result<(), PartitionError> {
    for comp in &graph.components {
        let rank = comp
            .rank
            .ok_or_else(|| PartitionError::Unassigned(comp.name.clone()))?;
        if !world.contains(rank) {
            return Err(PartitionError::OutOfRange {
                comp: comp.name.clone(),
                rank: rank.rank,
                thread: rank.thread,
            });
        }
    }
    for link in &graph.links {
        if !link.no_cut {
            continue;
        }
        if let [Some(a), Some(b)] = &link.endpoints {
            let ra = graph.component(a.component).and_then(|c| c.rank);
            let rb = graph.component(b.component).and_then(|c| c.rank);
            if ra != rb {
                return Err(PartitionError::NoCutViolated(link.name.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> ConfigGraph {
        let mut g = ConfigGraph::new();
        let ids: Vec<_> = (0..n).map(|i| g.add_component(format!("c{i}"), "t")).collect();
        for w in ids.windows(2) {
            let name = format!("l{}", w[0]);
            g.add_link(w[0], name.clone(), "right", "1ns");
            g.add_link(w[1], name, "left", "1ns");
        }
        g
    }

    #[test]
    fn single_assigns_everything_to_zero() {
        let mut g = chain(4);
        SinglePartitioner
            .partition(&mut g, WorldShape::new(1, 1))
            .unwrap();
        validate_assignment(&g, WorldShape::new(1, 1)).unwrap();
        assert!(g
            .components
            .iter()
            .all(|c| c.rank == Some(RankInfo::new(0, 0))));
    }

    #[test]
    fn registry_resolves_specs() {
        let reg = PartitionerRegistry::standard();
        assert!(reg.lookup("linear").is_ok());
        assert!(reg.lookup("round-robin").is_ok());
        assert!(matches!(
            reg.lookup("external:zoltan"),
            Err(PartitionError::UnknownPartitioner(_))
        ));
    }
}

//! # parsim-core::partition::graph
//!
//! The collapsed view partitioners operate on: components connected by
//! `no_cut` links merge into one group, and parallel links between groups
//! aggregate into one weighted edge. Partition results map back onto the
//! ConfigGraph through the group membership.

use parsim_types::{
    config::ConfigGraph,
    errors::PartitionError,
    id::{ComponentId, WorldShape, SUBCOMPONENT_BITS},
};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;

/// One vertex of the collapsed graph.
#[derive(Debug, Clone)]
pub struct PartitionGroup {
    /// Member components, ascending by ID; the minimum ID orders groups.
    pub members: Vec<ComponentId>,
    /// Vertex weight: sum of member component weights.
    pub weight: f32,
}

pub struct PartitionGraph {
    pub graph: UnGraph<PartitionGroup, u32>,
    /// Groups sorted by their minimum member ID; index = group ordinal.
    pub order: Vec<NodeIndex>,
}

impl PartitionGraph {
    /// Collapses a config graph: `no_cut` link endpoints union into groups.
    pub fn collapse(config: &ConfigGraph) -> PartitionGraph {
        let n = config.components.len();
        let ordinal = |id: ComponentId| (id >> SUBCOMPONENT_BITS) as usize;

        let mut uf: UnionFind<usize> = UnionFind::new(n);
        for link in &config.links {
            if !link.no_cut {
                continue;
            }
            if let [Some(a), Some(b)] = &link.endpoints {
                uf.union(ordinal(a.component), ordinal(b.component));
            }
        }

        // Gather members per representative, in component-id order.
        let mut groups: std::collections::BTreeMap<usize, PartitionGroup> = Default::default();
        for comp in &config.components {
            let rep = uf.find(ordinal(comp.id));
            let group = groups.entry(rep).or_insert_with(|| PartitionGroup {
                members: Vec::new(),
                weight: 0.0,
            });
            group.members.push(comp.id);
            group.weight += comp.weight;
        }

        let mut graph = UnGraph::new_undirected();
        let mut index_of_rep = std::collections::BTreeMap::new();
        let mut order = Vec::with_capacity(groups.len());
        // BTreeMap iteration is ascending by representative, which is the
        // minimum-id order because representatives come from ordinals.
        let mut keyed: Vec<(usize, PartitionGroup)> = groups.into_iter().collect();
        keyed.sort_by_key(|(_, g)| g.members[0]);
        for (rep, group) in keyed {
            let idx = graph.add_node(group);
            index_of_rep.insert(rep, idx);
            order.push(idx);
        }

        // Aggregate cut-able links into weighted edges between groups.
        for link in &config.links {
            if let [Some(a), Some(b)] = &link.endpoints {
                let ga = index_of_rep[&uf.find(ordinal(a.component))];
                let gb = index_of_rep[&uf.find(ordinal(b.component))];
                if ga == gb {
                    continue;
                }
                if let Some(e) = graph.find_edge(ga, gb) {
                    graph[e] += 1;
                } else {
                    graph.add_edge(ga, gb, 1);
                }
            }
        }

        PartitionGraph { graph, order }
    }

    pub fn group_count(&self) -> usize {
        self.order.len()
    }

    /// Groups in deterministic (minimum member ID) order.
    pub fn groups(&self) -> impl Iterator<Item = &PartitionGroup> {
        self.order.iter().map(move |idx| &self.graph[*idx])
    }

    /// Annotates one partition ordinal per group back onto the config graph.
    pub fn apply(
        &self,
        config: &mut ConfigGraph,
        world: WorldShape,
        assignment: &[u32],
    ) -> Result<(), PartitionError> {
        if assignment.len() != self.order.len() {
            return Err(PartitionError::External(
                "assignment".to_string(),
                format!(
                    "expected {} entries, got {}",
                    self.order.len(),
                    assignment.len()
                ),
            ));
        }
        for (idx, part) in self.order.iter().zip(assignment) {
            let rank = world.partition(*part);
            for member in &self.graph[*idx].members {
                if let Some(c) = config.component_mut(*member) {
                    c.rank = Some(rank);
                    for s in &mut c.sub_components {
                        s.rank = Some(rank);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cut_links_merge_groups() {
        let mut g = ConfigGraph::new();
        let a = g.add_component("a", "t");
        let b = g.add_component("b", "t");
        let c = g.add_component("c", "t");
        g.add_link(a, "ab", "p", "1ns");
        g.add_link(b, "ab", "p", "1ns");
        g.set_no_cut("ab", true);
        g.add_link(b, "bc", "p", "1ns");
        g.add_link(c, "bc", "p", "1ns");

        let pg = PartitionGraph::collapse(&g);
        assert_eq!(pg.group_count(), 2);
        let sizes: Vec<usize> = pg.groups().map(|grp| grp.members.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
        // The cut-able link shows up as one aggregated edge.
        assert_eq!(pg.graph.edge_count(), 1);
    }
}

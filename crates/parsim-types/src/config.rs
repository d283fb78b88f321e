//! # parsim-types::config
//!
//! The declarative configuration graph: components, parameters, and links.
//! A front-end (or the TOML/YAML loader here) builds a `ConfigGraph`, the
//! graph is validated, a partitioner annotates ranks onto it, and wire-up
//! consumes it destructively to materialize live components and links.

use crate::{
    errors::ConfigError,
    id::{component_id, subcomponent_id, ComponentId, RankInfo},
    params::Params,
    time::TimeQuantity,
};
use serde::{Deserialize, Serialize};

/// One endpoint of a configured link.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigLinkEndpoint {
    pub component: ComponentId,
    pub port: String,
    /// Raw latency string, e.g. "1ns" or "2.2GHz" (frequency = period).
    pub latency: String,
}

/// A declarative link: one logical edge between exactly two endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigLink {
    pub id: usize,
    pub name: String,
    /// Endpoint slots fill in call order; both must be populated by the time
    /// the graph is submitted for wire-up.
    pub endpoints: [Option<ConfigLinkEndpoint>; 2],
    /// When set, the partitioner must keep both endpoints in one partition.
    #[serde(default)]
    pub no_cut: bool,
    /// Connection attempts beyond the two slots; a structural error.
    #[serde(default, skip_serializing)]
    pub extra_endpoints: u32,
}

impl ConfigLink {
    /// Both endpoint slots populated.
    pub fn is_complete(&self) -> bool {
        self.endpoints[0].is_some() && self.endpoints[1].is_some()
    }
}

/// A declarative component record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigComponent {
    pub id: ComponentId,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub params: Params,
    /// Filled in by the partitioner.
    pub rank: Option<RankInfo>,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub sub_components: Vec<ConfigComponent>,
}

fn default_weight() -> f32 {
    1.0
}

/// The pre-simulation description of the whole system.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConfigGraph {
    pub components: Vec<ConfigComponent>,
    pub links: Vec<ConfigLink>,
}

/// Knowledge about registered element types, provided by the engine's
/// factory so structural validation can reject unknown types and ports.
pub trait ElementTypes {
    fn has_type(&self, ty: &str) -> bool;
    /// Declared port names for a type; `None` if the type is unknown.
    fn ports(&self, ty: &str) -> Option<&[&'static str]>;
}

impl ConfigGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level component and returns its ID. IDs are dense: the
    /// n-th call yields `component_id(n)`.
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        ty: impl Into<String>,
    ) -> ComponentId {
        let id = component_id(self.components.len() as u64);
        self.components.push(ConfigComponent {
            id,
            name: name.into(),
            ty: ty.into(),
            params: Params::new(),
            rank: None,
            weight: 1.0,
            sub_components: Vec::new(),
        });
        id
    }

    /// Adds a sub-component under `parent`; its ID embeds the parent's.
    pub fn add_sub_component(
        &mut self,
        parent: ComponentId,
        name: impl Into<String>,
        ty: impl Into<String>,
    ) -> Option<ComponentId> {
        let pc = self.component_mut(parent)?;
        let id = subcomponent_id(parent, pc.sub_components.len() as u64);
        pc.sub_components.push(ConfigComponent {
            id,
            name: name.into(),
            ty: ty.into(),
            params: Params::new(),
            rank: None,
            weight: 0.0,
            sub_components: Vec::new(),
        });
        Some(id)
    }

    pub fn set_weight(&mut self, id: ComponentId, weight: f32) {
        if let Some(c) = self.component_mut(id) {
            c.weight = weight;
        }
    }

    pub fn set_param(&mut self, id: ComponentId, key: &str, value: impl Into<String>) {
        if let Some(c) = self.component_mut(id) {
            c.params.insert(key, value);
        }
    }

    /// Connects `component.port` to the link called `name`, creating the
    /// link on first mention. The first two calls for a name fill the two
    /// endpoint slots; a third is a structural error recorded on the link.
    pub fn add_link(
        &mut self,
        component: ComponentId,
        name: impl Into<String>,
        port: impl Into<String>,
        latency: impl Into<String>,
    ) -> usize {
        let name = name.into();
        let idx = match self.links.iter().position(|l| l.name == name) {
            Some(i) => i,
            None => {
                self.links.push(ConfigLink {
                    id: self.links.len(),
                    name: name.clone(),
                    endpoints: [None, None],
                    no_cut: false,
                    extra_endpoints: 0,
                });
                self.links.len() - 1
            }
        };
        let ep = ConfigLinkEndpoint {
            component,
            port: port.into(),
            latency: latency.into(),
        };
        let link = &mut self.links[idx];
        if link.endpoints[0].is_none() {
            link.endpoints[0] = Some(ep);
        } else if link.endpoints[1].is_none() {
            link.endpoints[1] = Some(ep);
        } else {
            link.extra_endpoints += 1;
        }
        idx
    }

    pub fn set_no_cut(&mut self, link_name: &str, no_cut: bool) {
        if let Some(l) = self.links.iter_mut().find(|l| l.name == link_name) {
            l.no_cut = no_cut;
        }
    }

    pub fn component(&self, id: ComponentId) -> Option<&ConfigComponent> {
        let top = (id >> crate::id::SUBCOMPONENT_BITS) as usize;
        let c = self.components.get(top)?;
        if c.id == id {
            return Some(c);
        }
        c.sub_components.iter().find(|s| s.id == id)
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut ConfigComponent> {
        let top = (id >> crate::id::SUBCOMPONENT_BITS) as usize;
        let c = self.components.get_mut(top)?;
        if c.id == id {
            return Some(c);
        }
        c.sub_components.iter_mut().find(|s| s.id == id)
    }

    /// Assigns every component (and its sub-components) to one partition.
    pub fn set_all_ranks(&mut self, rank: RankInfo) {
        for c in &mut self.components {
            c.rank = Some(rank);
            for s in &mut c.sub_components {
                s.rank = Some(rank);
            }
        }
    }

    /// Validates the graph. Returns every structural error found, in a
    /// deterministic order; an empty vector means the graph is sound.
    pub fn check_structural_errors(&self, types: &dyn ElementTypes) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        // Dangling links: both endpoint slots must be populated, and only
        // the two slots.
        for link in &self.links {
            if link.extra_endpoints > 0 {
                errors.push(ConfigError::TooManyEndpoints(link.name.clone()));
            }
            if !link.is_complete() {
                errors.push(ConfigError::DanglingLink(link.name.clone()));
                continue;
            }
            for ep in link.endpoints.iter().flatten() {
                match self.component(ep.component) {
                    None => errors.push(ConfigError::UnknownComponent(link.name.clone())),
                    Some(c) => {
                        if let Some(ports) = types.ports(&c.ty) {
                            if !ports.contains(&ep.port.as_str()) {
                                errors.push(ConfigError::UnknownPort {
                                    comp: c.name.clone(),
                                    ty: c.ty.clone(),
                                    port: ep.port.clone(),
                                });
                            }
                        }
                    }
                }
                if let Err(e) = TimeQuantity::parse(&ep.latency) {
                    errors.push(e);
                }
            }
        }

        // Duplicate component names.
        let mut seen = std::collections::BTreeSet::new();
        for c in &self.components {
            if !seen.insert(c.name.as_str()) {
                errors.push(ConfigError::DuplicateComponentName(c.name.clone()));
            }
        }

        // Unknown component types.
        for c in &self.components {
            if !types.has_type(&c.ty) {
                errors.push(ConfigError::UnknownComponentType {
                    comp: c.name.clone(),
                    ty: c.ty.clone(),
                });
            }
            for s in &c.sub_components {
                if !types.has_type(&s.ty) {
                    errors.push(ConfigError::UnknownComponentType {
                        comp: s.name.clone(),
                        ty: s.ty.clone(),
                    });
                }
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// File schema: the CLI-facing TOML/YAML representation, resolved by name.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FileEndpoint {
    component: String,
    port: String,
    latency: String,
}

#[derive(Debug, Deserialize)]
struct FileLink {
    name: String,
    left: FileEndpoint,
    right: FileEndpoint,
    #[serde(default)]
    no_cut: bool,
}

#[derive(Debug, Deserialize)]
struct FileComponent {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default = "default_weight")]
    weight: f32,
    #[serde(default)]
    params: Params,
}

#[derive(Debug, Deserialize)]
struct GraphFile {
    #[serde(default)]
    component: Vec<FileComponent>,
    #[serde(default)]
    link: Vec<FileLink>,
}

impl ConfigGraph {
    /// Loads a graph from TOML or YAML text, keyed by file extension.
    pub fn from_path(path: &std::path::Path) -> Result<ConfigGraph, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let file: GraphFile = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            _ => toml::from_str(&text)?,
        };
        Self::from_file(file)
    }

    fn from_file(file: GraphFile) -> Result<ConfigGraph, ConfigError> {
        let mut graph = ConfigGraph::new();
        let mut by_name = std::collections::BTreeMap::new();
        for fc in file.component {
            let id = graph.add_component(fc.name.clone(), fc.ty);
            graph.set_weight(id, fc.weight);
            for (k, v) in fc.params.iter() {
                graph.set_param(id, k, v);
            }
            by_name.insert(fc.name, id);
        }
        for fl in file.link {
            for ep in [&fl.left, &fl.right] {
                let id = *by_name
                    .get(&ep.component)
                    .ok_or_else(|| ConfigError::UnknownComponent(fl.name.clone()))?;
                graph.add_link(id, fl.name.clone(), ep.port.clone(), ep.latency.clone());
            }
            graph.set_no_cut(&fl.name, fl.no_cut);
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AnyType;
    impl ElementTypes for AnyType {
        fn has_type(&self, _ty: &str) -> bool {
            true
        }
        fn ports(&self, _ty: &str) -> Option<&[&'static str]> {
            None
        }
    }

    #[test]
    fn dense_ids_and_link_slots() {
        let mut g = ConfigGraph::new();
        let a = g.add_component("a", "t");
        let b = g.add_component("b", "t");
        assert_eq!(a, component_id(0));
        assert_eq!(b, component_id(1));
        g.add_link(a, "ab", "out", "1ns");
        g.add_link(b, "ab", "in", "1ns");
        assert_eq!(g.links.len(), 1);
        assert!(g.links[0].is_complete());
        assert!(g.check_structural_errors(&AnyType).is_empty());
    }

    #[test]
    fn dangling_link_is_structural_error() {
        let mut g = ConfigGraph::new();
        let a = g.add_component("a", "t");
        g.add_link(a, "dangler", "out", "1ns");
        let errs = g.check_structural_errors(&AnyType);
        assert!(matches!(errs[0], ConfigError::DanglingLink(_)));
    }

    #[test]
    fn duplicate_names_are_reported() {
        let mut g = ConfigGraph::new();
        g.add_component("same", "t");
        g.add_component("same", "t");
        let errs = g.check_structural_errors(&AnyType);
        assert!(errs
            .iter()
            .any(|e| matches!(e, ConfigError::DuplicateComponentName(_))));
    }

    #[test]
    fn loads_toml_graph() {
        let text = r#"
            [[component]]
            name = "left"
            type = "ping_pong"
            [component.params]
            port = "port"

            [[component]]
            name = "right"
            type = "ping_pong"

            [[link]]
            name = "wire"
            left = { component = "left", port = "port", latency = "1ns" }
            right = { component = "right", port = "port", latency = "1ns" }
        "#;
        let file: GraphFile = toml::from_str(text).unwrap();
        let g = ConfigGraph::from_file(file).unwrap();
        assert_eq!(g.components.len(), 2);
        assert!(g.links[0].is_complete());
    }
}

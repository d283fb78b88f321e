//! # parsim-core::factory
//!
//! The element registry: instantiates components by type name. Registration
//! carries the declared port list so structural validation can reject
//! unknown ports before anything is built. Constructors are closures, so
//! embedders can capture whatever environment their components need.

use crate::{component::Component, sim::BuildCtx};
use indexmap::IndexMap;
use parsim_types::{config::ElementTypes, errors::SimError};
use std::sync::Arc;

/// Constructor for a registered element type.
pub type ComponentCtor =
    Arc<dyn Fn(&mut BuildCtx) -> Result<Box<dyn Component>, SimError> + Send + Sync>;

/// Description of one element type.
#[derive(Clone)]
pub struct ElementInfo {
    pub name: &'static str,
    /// Port names this type may be wired on.
    pub ports: &'static [&'static str],
    pub ctor: ComponentCtor,
}

/// The type-name → constructor registry. Insertion order is preserved so
/// `list` output is stable.
#[derive(Default, Clone)]
pub struct Factory {
    types: IndexMap<&'static str, ElementInfo>,
}

impl Factory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: ElementInfo) {
        if self.types.insert(info.name, info).is_some() {
            tracing::warn!("element type registered twice; replacing");
        }
    }

    /// Convenience registration from a closure.
    pub fn register_fn<F>(&mut self, name: &'static str, ports: &'static [&'static str], ctor: F)
    where
        F: Fn(&mut BuildCtx) -> Result<Box<dyn Component>, SimError> + Send + Sync + 'static,
    {
        self.register(ElementInfo {
            name,
            ports,
            ctor: Arc::new(ctor),
        });
    }

    pub fn lookup(&self, ty: &str) -> Option<&ElementInfo> {
        self.types.get(ty)
    }

    /// Instantiates a component of the given registered type.
    pub fn create(&self, ty: &str, ctx: &mut BuildCtx) -> Result<Box<dyn Component>, SimError> {
        let info = self.types.get(ty).ok_or_else(|| {
            SimError::ComponentFailure(
                ctx.name().to_string(),
                "create",
                format!("unknown type '{ty}'"),
            )
        })?;
        (info.ctor)(ctx)
    }

    pub fn list(&self) -> impl Iterator<Item = &ElementInfo> {
        self.types.values()
    }
}

impl ElementTypes for Factory {
    fn has_type(&self, ty: &str) -> bool {
        self.types.contains_key(ty)
    }

    fn ports(&self, ty: &str) -> Option<&[&'static str]> {
        self.types.get(ty).map(|i| i.ports)
    }
}

//! # parsim-elements::terminator
//!
//! A primary component that releases its hold on the simulation at a
//! configured simulated time, via a one-shot clock edge.

use parsim_core::{
    component::{BuildCtx, Component, SimCtx},
    factory::Factory,
};
use parsim_types::{errors::SimError, id::HandlerToken, time::SimTime};

const RELEASE: HandlerToken = 0;

pub struct Terminator;

impl Terminator {
    pub fn build(ctx: &mut BuildCtx) -> Result<Box<dyn Component>, SimError> {
        let name = ctx.name().to_string();
        let done_at: String = ctx
            .params()
            .require(&name, "done_at")
            .map_err(|e| SimError::ComponentFailure(name.clone(), "build", e.to_string()))?;
        ctx.register_primary();
        // A clock whose first edge is the release time; the handler
        // unregisters immediately so it never fires again.
        ctx.register_clock(&done_at, RELEASE)?;
        Ok(Box::new(Terminator))
    }
}

impl Component for Terminator {
    fn on_clock(
        &mut self,
        ctx: &mut SimCtx,
        _token: HandlerToken,
        cycle: SimTime,
    ) -> Result<bool, SimError> {
        tracing::debug!(cycle, "terminator releasing primary hold");
        ctx.primary_component_done();
        Ok(true)
    }
}

pub fn register(factory: &mut Factory) {
    factory.register_fn("terminator", &[], Terminator::build);
}

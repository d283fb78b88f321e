//! # parsim-elements::clock_counter
//!
//! Counts edges of one registered clock. Mostly useful for calibrating a
//! configuration and in tests; logs its count on finish.

use parsim_core::{
    component::{BuildCtx, Component, SimCtx},
    factory::Factory,
};
use parsim_types::{errors::SimError, id::HandlerToken, time::SimTime};

const TICK: HandlerToken = 0;

pub struct ClockCounter {
    ticks: u64,
    /// Unregister after this many edges; 0 means never.
    limit: u64,
}

impl ClockCounter {
    pub fn build(ctx: &mut BuildCtx) -> Result<Box<dyn Component>, SimError> {
        let name = ctx.name().to_string();
        let period: String = ctx
            .params()
            .get(&name, "period", "1ns".to_string())
            .map_err(|e| SimError::ComponentFailure(name.clone(), "build", e.to_string()))?;
        let limit = ctx
            .params()
            .get(&name, "limit", 0u64)
            .map_err(|e| SimError::ComponentFailure(name.clone(), "build", e.to_string()))?;
        ctx.register_clock(&period, TICK)?;
        Ok(Box::new(ClockCounter { ticks: 0, limit }))
    }
}

impl Component for ClockCounter {
    fn on_clock(
        &mut self,
        _ctx: &mut SimCtx,
        _token: HandlerToken,
        _cycle: SimTime,
    ) -> Result<bool, SimError> {
        self.ticks += 1;
        Ok(self.limit != 0 && self.ticks >= self.limit)
    }

    fn finish(&mut self, ctx: &mut SimCtx) {
        tracing::info!(ticks = self.ticks, cycle = ctx.now(), "clock counter total");
    }
}

pub fn register(factory: &mut Factory) {
    factory.register_fn("clock_counter", &[], ClockCounter::build);
}

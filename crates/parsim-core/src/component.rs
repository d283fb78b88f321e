//! # parsim-core::component
//!
//! The Component trait: the capability set every simulation unit implements.
//! Concrete components are registered with the [`crate::factory::Factory`]
//! by type name and constructed during wire-up with a [`BuildCtx`]; at run
//! time they interact with the engine exclusively through [`SimCtx`].

pub use crate::sim::{BuildCtx, SimCtx};

use crate::event::Event;
use parsim_types::{
    errors::SimError,
    id::{HandlerToken, LinkId},
    time::SimTime,
};

/// A user-defined simulation unit. Pinned to its assigned thread for the
/// whole run and never touched by any other thread during Run.
pub trait Component: Send {
    /// Called once after wire-up and the untimed init phases, before Run.
    fn setup(&mut self, ctx: &mut SimCtx) -> Result<(), SimError> {
        let _ = ctx;
        Ok(())
    }

    /// One untimed init phase. Phases repeat until no rank sends untimed
    /// data; components must tolerate being called for phases they do not
    /// participate in.
    fn init(&mut self, ctx: &mut SimCtx, phase: u32) -> Result<(), SimError> {
        let _ = (ctx, phase);
        Ok(())
    }

    /// One untimed complete phase, after Run.
    fn complete(&mut self, ctx: &mut SimCtx, phase: u32) -> Result<(), SimError> {
        let _ = (ctx, phase);
        Ok(())
    }

    /// Called once after the complete phases; last chance to flush state.
    fn finish(&mut self, ctx: &mut SimCtx) {
        let _ = ctx;
    }

    /// Called on fatal shutdown paths. Must not touch the engine.
    fn emergency_shutdown(&mut self) {}

    /// Push-style delivery for links this component installed a handler on.
    fn handle_event(&mut self, ctx: &mut SimCtx, link: LinkId, event: Event)
        -> Result<(), SimError> {
        let _ = (ctx, event);
        tracing::warn!(link, "event delivered to component without a handler implementation");
        Ok(())
    }

    /// A clock edge for a handler this component registered. Returning
    /// `Ok(true)` unregisters the handler from that clock.
    fn on_clock(
        &mut self,
        ctx: &mut SimCtx,
        token: HandlerToken,
        cycle: SimTime,
    ) -> Result<bool, SimError> {
        let _ = (ctx, token, cycle);
        Ok(true)
    }
}

//! # parsim-elements::ping_pong
//!
//! Two components bouncing an event across one link. The initiator holds
//! the simulation alive until the configured number of round trips
//! completed; the responder just echoes. Works identically whether the two
//! ends share a thread, a process, or neither.

use bytes::Bytes;
use parsim_core::{
    component::{BuildCtx, Component, SimCtx},
    event::Event,
    factory::Factory,
};
use parsim_types::{errors::SimError, id::LinkId};

pub struct PingPong {
    link: LinkId,
    initiate: bool,
    rounds: u64,
    received: u64,
}

impl PingPong {
    pub fn build(ctx: &mut BuildCtx) -> Result<Box<dyn Component>, SimError> {
        let initiate = ctx
            .params()
            .get(ctx.name(), "initiate", false)
            .map_err(|e| SimError::ComponentFailure(ctx.name().to_string(), "build", e.to_string()))?;
        let rounds = ctx
            .params()
            .get(ctx.name(), "rounds", 100u64)
            .map_err(|e| SimError::ComponentFailure(ctx.name().to_string(), "build", e.to_string()))?;
        let link = ctx.link("port")?;
        ctx.set_handler(link)?;
        if initiate {
            ctx.register_primary();
        }
        Ok(Box::new(PingPong {
            link,
            initiate,
            rounds,
            received: 0,
        }))
    }
}

impl Component for PingPong {
    fn setup(&mut self, ctx: &mut SimCtx) -> Result<(), SimError> {
        if self.initiate {
            ctx.send(self.link, 0, Bytes::from_static(b"ping"))?;
        }
        Ok(())
    }

    fn handle_event(&mut self, ctx: &mut SimCtx, _link: LinkId, _event: Event)
        -> Result<(), SimError> {
        self.received += 1;
        if self.initiate {
            if self.received >= self.rounds {
                tracing::debug!(rounds = self.received, cycle = ctx.now(), "ping-pong done");
                ctx.primary_component_done();
                return Ok(());
            }
            ctx.send(self.link, 0, Bytes::from_static(b"ping"))
        } else {
            ctx.send(self.link, 0, Bytes::from_static(b"pong"))
        }
    }
}

pub fn register(factory: &mut Factory) {
    factory.register_fn("ping_pong", &["port"], PingPong::build);
}

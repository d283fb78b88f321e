//! # parsim-core::clock
//!
//! The clock registry. Clocks are deduplicated by period factor: all
//! handlers with the same period share one Clock activity, invoked in
//! registration order. A handler returning `true` is unregistered; a clock
//! whose handler list empties removes itself from the vortex by simply not
//! rescheduling.

use crate::timelord::TimeConverter;
use fxhash::FxHashMap;
use parsim_types::{
    errors::SimError,
    id::{ComponentId, HandlerToken},
    time::SimTime,
};

/// One registered handler: the owning component and its opaque token.
/// Dispatch calls `Component::on_clock(ctx, token, cycle)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockHandler {
    pub component: ComponentId,
    pub token: HandlerToken,
}

/// A shared periodic clock.
#[derive(Debug)]
pub struct Clock {
    pub period: TimeConverter,
    pub next_fire: SimTime,
    pub handlers: Vec<ClockHandler>,
    /// True while a Clock activity for this factor sits in the vortex.
    pub scheduled: bool,
}

/// The per-scheduler registry, keyed by period factor.
#[derive(Default)]
pub struct ClockMap {
    clocks: FxHashMap<SimTime, Clock>,
}

impl ClockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` on the shared clock with this period. Returns
    /// `true` if a new Clock was created and needs scheduling at
    /// `now + period`.
    pub fn register(
        &mut self,
        period: TimeConverter,
        now: SimTime,
        handler: ClockHandler,
    ) -> bool {
        let factor = period.factor();
        let created = !self.clocks.contains_key(&factor);
        let clock = self.clocks.entry(factor).or_insert_with(|| Clock {
            period,
            next_fire: now.saturating_add(factor),
            handlers: Vec::new(),
            scheduled: false,
        });
        clock.handlers.push(handler);
        if created {
            clock.scheduled = true;
        }
        created
    }

    /// The cycle at which this converter's clock next fires. Used by
    /// components to align actions to a clock edge.
    pub fn next_cycle(&self, tc: TimeConverter) -> Result<SimTime, SimError> {
        self.clocks
            .get(&tc.factor())
            .map(|c| c.next_fire)
            .ok_or(SimError::UnknownClock(tc.factor()))
    }

    /// Re-registers a handler on an existing clock; the handler starts
    /// firing at the clock's next edge. Errors if no such clock exists.
    pub fn reregister(
        &mut self,
        tc: TimeConverter,
        handler: ClockHandler,
    ) -> Result<SimTime, SimError> {
        let clock = self
            .clocks
            .get_mut(&tc.factor())
            .ok_or(SimError::UnknownClock(tc.factor()))?;
        clock.handlers.push(handler);
        Ok(clock.next_fire)
    }

    /// Takes a clock out for dispatch; the scheduler puts it back (or drops
    /// it when the handler list emptied).
    pub fn take(&mut self, factor: SimTime) -> Option<Clock> {
        self.clocks.remove(&factor)
    }

    pub fn put_back(&mut self, factor: SimTime, clock: Clock) {
        self.clocks.insert(factor, clock);
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timelord::TimeLord;

    #[test]
    fn handlers_with_equal_period_share_one_clock() {
        let lord = TimeLord::new("1ps").unwrap();
        let tc = lord.converter("1ns").unwrap();
        let mut clocks = ClockMap::new();
        let h = |c: u64| ClockHandler {
            component: c,
            token: 0,
        };
        assert!(clocks.register(tc, 0, h(1)));
        assert!(!clocks.register(lord.converter("1GHz").unwrap(), 0, h(2)));
        assert_eq!(clocks.len(), 1);
        assert_eq!(clocks.next_cycle(tc).unwrap(), 1000);
    }

    #[test]
    fn unknown_clock_is_an_error() {
        let lord = TimeLord::new("1ps").unwrap();
        let clocks = ClockMap::new();
        assert!(matches!(
            clocks.next_cycle(lord.converter("1ns").unwrap()),
            Err(SimError::UnknownClock(_))
        ));
    }
}

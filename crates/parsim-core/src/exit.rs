//! # parsim-core::exit
//!
//! Primary-component tracking. Primary components hold the simulation alive
//! until every one of them has called `primary_component_done`; the global
//! count is evaluated at sync epochs (multi-partition) or by a dedicated
//! Exit activity (single partition). The count is monotonically
//! non-increasing from its initial value to zero.

use fxhash::FxHashSet;
use parsim_types::{id::ComponentId, time::SimTime};

/// The message carried by the queue-empty guard stop action.
pub const EMPTY_QUEUE_MESSAGE: &str = "Event queue empty, exiting simulation...";

/// Per-thread primary-component state.
#[derive(Debug, Default)]
pub struct ExitState {
    primaries: FxHashSet<ComponentId>,
    /// The latest simulated time at which a local primary released its hold.
    end_cycle: SimTime,
}

impl ExitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, comp: ComponentId) {
        self.primaries.insert(comp);
    }

    /// Releases `comp`'s hold. Returns `true` if this was the last local
    /// primary.
    pub fn done(&mut self, comp: ComponentId, now: SimTime) -> bool {
        if self.primaries.remove(&comp) && now > self.end_cycle {
            self.end_cycle = now;
        }
        self.primaries.is_empty()
    }

    pub fn count(&self) -> u64 {
        self.primaries.len() as u64
    }

    pub fn end_cycle(&self) -> SimTime {
        self.end_cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_monotone_to_zero() {
        let mut exit = ExitState::new();
        exit.register(1);
        exit.register(2);
        assert_eq!(exit.count(), 2);
        assert!(!exit.done(1, 500));
        assert_eq!(exit.count(), 1);
        // Releasing twice has no effect.
        assert!(!exit.done(1, 600));
        assert!(exit.done(2, 1000));
        assert_eq!(exit.count(), 0);
        assert_eq!(exit.end_cycle(), 1000);
    }
}

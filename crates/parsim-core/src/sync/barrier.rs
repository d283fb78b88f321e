//! # parsim-core::sync::barrier
//!
//! A reusable barrier with a timeout. `std::sync::Barrier` has no timeout,
//! and a partition failing to reach a sync barrier within the host-level
//! timeout is a fatal condition the caller must be able to observe.

use parsim_types::errors::SimError;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct BarrierState {
    waiting: usize,
    generation: u64,
}

pub struct Barrier {
    state: Mutex<BarrierState>,
    cvar: Condvar,
    parties: usize,
    timeout: Duration,
}

impl Barrier {
    pub fn new(parties: usize, timeout: Duration) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                waiting: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
            parties,
            timeout,
        }
    }

    /// Blocks until all parties arrive or the timeout elapses.
    pub fn wait(&self) -> Result<(), SimError> {
        let mut state = self.state.lock().expect("barrier poisoned");
        state.waiting += 1;
        if state.waiting == self.parties {
            state.waiting = 0;
            state.generation += 1;
            self.cvar.notify_all();
            return Ok(());
        }
        let generation = state.generation;
        let mut remaining = self.timeout;
        loop {
            let start = std::time::Instant::now();
            let (next, res) = self
                .cvar
                .wait_timeout(state, remaining)
                .expect("barrier poisoned");
            state = next;
            if state.generation != generation {
                return Ok(());
            }
            if res.timed_out() {
                return Err(SimError::BarrierTimeout(self.timeout.as_millis() as u64));
            }
            remaining = remaining.saturating_sub(start.elapsed());
        }
    }
}

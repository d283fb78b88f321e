//! # parsim-core::signals
//!
//! Latched OS signals. Handlers only set atomic flags; the dispatch loop
//! examines them between activities and the sync layer merges them across
//! partitions by or-reduction. INT/TERM request a graceful end, USR1/USR2 a
//! status print, ALRM fires the wall-time deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One latched flag, shareable with a signal handler.
#[derive(Clone, Debug, Default)]
pub struct Flag(Arc<AtomicBool>);

impl Flag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn peek(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SignalFlags {
    pub end: Flag,
    pub usr1: Flag,
    pub usr2: Flag,
    pub alrm: Flag,
}

impl SignalFlags {
    /// Creates the flag set without OS hooks (tests, embedded use).
    pub fn unhooked() -> SignalFlags {
        SignalFlags::default()
    }

    /// Creates the flag set and registers the OS signal handlers.
    pub fn install() -> std::io::Result<SignalFlags> {
        let flags = Self::unhooked();
        for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
            signal_hook::flag::register(sig, Arc::clone(&flags.end.0))?;
        }
        signal_hook::flag::register(signal_hook::consts::SIGUSR1, Arc::clone(&flags.usr1.0))?;
        signal_hook::flag::register(signal_hook::consts::SIGUSR2, Arc::clone(&flags.usr2.0))?;
        signal_hook::flag::register(signal_hook::consts::SIGALRM, Arc::clone(&flags.alrm.0))?;
        Ok(flags)
    }

    /// Drains all flags into the wire triple `(end, usr, alrm)`. The usr
    /// value is 1 for USR1, 2 for USR2 (USR2 wins when both are latched).
    pub fn snapshot_wire(&self) -> (u32, u32, u32) {
        let end = self.end.take() as u32;
        let usr1 = self.usr1.take();
        let usr2 = self.usr2.take();
        let usr = if usr2 {
            2
        } else if usr1 {
            1
        } else {
            0
        };
        let alrm = self.alrm.take() as u32;
        (end, usr, alrm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_latch_and_clear() {
        let f = SignalFlags::unhooked();
        f.usr1.raise();
        assert!(f.usr1.take());
        assert!(!f.usr1.take());
    }

    #[test]
    fn wire_snapshot_prefers_usr2() {
        let f = SignalFlags::unhooked();
        f.usr1.raise();
        f.usr2.raise();
        f.end.raise();
        assert_eq!(f.snapshot_wire(), (1, 2, 0));
        assert_eq!(f.snapshot_wire(), (0, 0, 0));
    }
}

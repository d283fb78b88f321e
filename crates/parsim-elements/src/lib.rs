//! # parsim-elements
//!
//! A small library of concrete components: enough to exercise every core
//! mechanism (links, clocks, primaries, untimed data) and to serve as the
//! reference style for user element libraries.

pub mod clock_counter;
pub mod ping_pong;
pub mod terminator;

use parsim_core::factory::Factory;

/// Registers every built-in element type with a factory.
pub fn register_builtin(factory: &mut Factory) {
    ping_pong::register(factory);
    clock_counter::register(factory);
    terminator::register(factory);
}

/// A factory pre-loaded with the built-in elements.
pub fn builtin_factory() -> Factory {
    let mut f = Factory::new();
    register_builtin(&mut f);
    f
}

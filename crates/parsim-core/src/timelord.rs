//! # parsim-core::timelord
//!
//! Conversion between human time units and integer core cycles. The TimeLord
//! owns the timebase (attoseconds per core cycle); a TimeConverter is an
//! immutable factor such that `sim_cycles = factor * units_of_this_converter`.
//! Equal frequencies canonicalize to the same factor, and the factor is the
//! equality key, so two converters with the same factor are the same
//! converter.

use parsim_types::{
    errors::ConfigError,
    time::{SimTime, TimeQuantity},
};

/// An immutable conversion factor into core cycles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeConverter {
    factor: SimTime,
}

impl TimeConverter {
    pub fn factor(&self) -> SimTime {
        self.factor
    }

    /// Converts a count in this converter's units into core cycles.
    pub fn to_core(&self, units: SimTime) -> SimTime {
        units.saturating_mul(self.factor)
    }

    /// Converts core cycles into this converter's units (truncating).
    pub fn from_core(&self, cycles: SimTime) -> SimTime {
        cycles / self.factor
    }
}

/// The keeper of the timebase.
#[derive(Copy, Clone, Debug)]
pub struct TimeLord {
    /// Attoseconds per core cycle.
    base_attos: u128,
}

impl TimeLord {
    /// Creates a TimeLord whose core cycle is the given timebase, e.g. "1ps".
    pub fn new(timebase: &str) -> Result<TimeLord, ConfigError> {
        let q = TimeQuantity::parse(timebase)?;
        Ok(TimeLord { base_attos: q.attos })
    }

    /// Attoseconds per core cycle.
    pub fn base_attos(&self) -> u128 {
        self.base_attos
    }

    /// Produces the TimeConverter for a unit string like "2.2GHz" or "1ns".
    /// A frequency denotes its period. Quantities below one core cycle are
    /// rejected; a period that does not divide evenly truncates.
    pub fn converter(&self, units: &str) -> Result<TimeConverter, ConfigError> {
        let q = TimeQuantity::parse(units)?;
        self.converter_of(q, units)
    }

    /// Like [`TimeLord::converter`] for an already-parsed quantity.
    pub fn converter_of(
        &self,
        q: TimeQuantity,
        origin: &str,
    ) -> Result<TimeConverter, ConfigError> {
        let factor = q.attos / self.base_attos;
        if factor == 0 {
            return Err(ConfigError::BadTimeString(origin.to_string()));
        }
        Ok(TimeConverter {
            factor: factor as SimTime,
        })
    }

    /// Parses a time string straight to core cycles.
    pub fn cycles(&self, units: &str) -> Result<SimTime, ConfigError> {
        Ok(self.converter(units)?.factor())
    }

    /// A converter representing exactly `cycles` core cycles. Used for the
    /// min-partition bound and the remote halves of cross-partition links.
    pub fn raw(&self, cycles: SimTime) -> TimeConverter {
        TimeConverter {
            factor: cycles.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_frequencies_share_a_factor() {
        let lord = TimeLord::new("1ps").unwrap();
        let a = lord.converter("1GHz").unwrap();
        let b = lord.converter("1ns").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.factor(), 1000);
    }

    #[test]
    fn femtosecond_base_resolves_fractional_periods() {
        let lord = TimeLord::new("1fs").unwrap();
        let tc = lord.converter("2.2GHz").unwrap();
        // 1/2.2GHz = 454545.45.. fs, truncated to the timebase.
        assert_eq!(tc.factor(), 454_545);
    }

    #[test]
    fn sub_cycle_quantities_are_rejected() {
        let lord = TimeLord::new("1ns").unwrap();
        assert!(lord.converter("1ps").is_err());
    }

    #[test]
    fn converts_both_directions() {
        let lord = TimeLord::new("1ps").unwrap();
        let ns = lord.converter("1ns").unwrap();
        assert_eq!(ns.to_core(3), 3000);
        assert_eq!(ns.from_core(4500), 4);
    }
}

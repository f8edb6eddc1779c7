//! Clock abstraction for the sampling loop and protocol layer
//!
//! The core never reads hardware timers directly; both execution contexts
//! consume time through the [`Clock`] trait so the firmware can supply its
//! millisecond/microsecond counters and tests can drive time by hand.

/// Milliseconds since device boot.
pub type Millis = u32;

/// Microseconds since device boot; wraps roughly every 71 minutes.
pub type Micros = u32;

/// Source of time for the node.
pub trait Clock {
    /// Current millisecond counter.
    fn millis(&self) -> Millis;

    /// Current microsecond counter.
    fn micros(&self) -> Micros;
}

/// Hand-driven clock for tests and host-side simulation.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ms: Millis,
}

impl ManualClock {
    /// Create a clock starting at the given millisecond count.
    pub fn new(ms: Millis) -> Self {
        Self { ms }
    }

    /// Set the clock to an absolute millisecond count.
    pub fn set(&mut self, ms: Millis) {
        self.ms = ms;
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&mut self, ms: Millis) {
        self.ms = self.ms.wrapping_add(ms);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> Millis {
        self.ms
    }

    fn micros(&self) -> Micros {
        self.ms.wrapping_mul(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let mut clock = ManualClock::new(1000);
        assert_eq!(clock.millis(), 1000);

        clock.advance(500);
        assert_eq!(clock.millis(), 1500);
        assert_eq!(clock.micros(), 1_500_000);
    }
}

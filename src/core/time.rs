//! Time management for the simulation
//!
//! The simulation operates on a single logical clock measured in
//! seconds. The engine advances it in fixed steps; everything that
//! happens "at the same instant" is resolved in the stable phase order
//! defined by the engine tick loop.

use serde::{Deserialize, Serialize};

/// Manages simulation time in seconds
///
/// # Example
/// ```
/// use factory_simulator_core_rs::SimClock;
///
/// let mut clock = SimClock::new(1.0, 3600.0);
/// assert_eq!(clock.now(), 0.0);
///
/// clock.advance();
/// assert_eq!(clock.now(), 1.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulated time in seconds
    now: f64,
    /// Seconds advanced per tick
    tick_seconds: f64,
    /// Simulation end time in seconds
    end_time: f64,
    /// Total ticks elapsed since start
    tick_count: u64,
}

impl SimClock {
    /// Create a new clock
    ///
    /// # Arguments
    /// * `tick_seconds` - Seconds the clock advances per tick
    /// * `end_time` - Simulation horizon in seconds
    ///
    /// # Panics
    /// Panics if `tick_seconds` is not strictly positive
    pub fn new(tick_seconds: f64, end_time: f64) -> Self {
        assert!(tick_seconds > 0.0, "tick_seconds must be positive");
        Self {
            now: 0.0,
            tick_seconds,
            end_time,
            tick_count: 0,
        }
    }

    /// Advance time by one tick
    pub fn advance(&mut self) {
        self.now += self.tick_seconds;
        self.tick_count += 1;
    }

    /// Current simulated time in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Seconds advanced per tick
    pub fn tick_seconds(&self) -> f64 {
        self.tick_seconds
    }

    /// Total ticks elapsed since start
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Simulation horizon in seconds
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// True once the clock has reached or passed the horizon
    pub fn is_finished(&self) -> bool {
        self.now >= self.end_time
    }

    /// True on ticks that fall on a multiple of `interval` seconds
    ///
    /// Used for fixed-cadence work such as the 10 s KPI publish and the
    /// 30 s status heartbeat. Tick 0 does not count as a boundary.
    pub fn on_interval(&self, interval: f64) -> bool {
        if self.tick_count == 0 {
            return false;
        }
        let ticks_per_interval = (interval / self.tick_seconds).round().max(1.0) as u64;
        self.tick_count % ticks_per_interval == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "tick_seconds must be positive")]
    fn test_zero_tick_seconds_panics() {
        SimClock::new(0.0, 100.0);
    }

    #[test]
    fn test_advance_and_finish() {
        let mut clock = SimClock::new(1.0, 3.0);
        assert!(!clock.is_finished());

        clock.advance();
        clock.advance();
        clock.advance();
        assert!(clock.is_finished());
        assert_eq!(clock.tick_count(), 3);
    }

    #[test]
    fn test_on_interval_cadence() {
        let mut clock = SimClock::new(1.0, 100.0);
        assert!(!clock.on_interval(10.0)); // tick 0 is not a boundary

        let mut boundaries = 0;
        for _ in 0..30 {
            clock.advance();
            if clock.on_interval(10.0) {
                boundaries += 1;
            }
        }
        assert_eq!(boundaries, 3);
    }
}

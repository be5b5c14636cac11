//! Wall clock timing.
use std::time::{Duration, Instant};

use crate::constants::*;

/// Frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Measures fixed periods of wall clock time.
///
/// The clock does not try to catch up. When a period is overrun,
/// for example because the owner was suspended, the next period
/// simply starts from the moment the overrun was noticed.
#[derive(Debug, Clone)]
pub struct Clock {
    start: Instant,
    period: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(period: Duration) -> Self {
        Self {
            start: Instant::now(),
            period,
        }
    }

    pub fn from_hz(freq: Hz) -> Self {
        Self::new(freq.into())
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.start = Instant::now()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left in the current period, zero if it was overrun.
    pub fn remaining(&self) -> Duration {
        self.period.saturating_sub(self.elapsed())
    }

    /// Check whether a full period has passed, restarting the clock if it has.
    pub fn tick(&mut self) -> bool {
        if self.elapsed() >= self.period {
            self.reset();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);
        assert_eq!(Duration::from(Hz(0)), Duration::ZERO);
    }

    #[test]
    fn test_tick_after_period() {
        let mut clock = Clock::new(Duration::from_millis(5));
        assert!(!clock.tick());

        thread::sleep(Duration::from_millis(10));
        assert!(clock.tick());
        // Restarted, no catch up for the overrun.
        assert!(!clock.tick());
    }

    #[test]
    fn test_remaining_saturates() {
        let clock = Clock::new(Duration::ZERO);
        assert_eq!(clock.remaining(), Duration::ZERO);

        let clock = Clock::new(Duration::from_secs(60));
        assert!(clock.remaining() > Duration::from_secs(59));
    }
}

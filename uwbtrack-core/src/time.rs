//! Cycle timing
//!
//! The tracker only ever needs elapsed milliseconds: for the reseed timeout
//! and for the sleep at the end of each cycle. Clocks are therefore
//! monotonic counters, never wall time.

/// Milliseconds since an arbitrary fixed origin (boot, process start)
pub type Timestamp = u64;

/// Source of monotonic time
pub trait TimeSource {
    /// Current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Milliseconds elapsed since `earlier`, zero if the clock is behind it
    fn elapsed_since(&self, earlier: Timestamp) -> u64 {
        self.now().saturating_sub(earlier)
    }
}

/// Monotonic clock over `std::time::Instant`
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    /// Clock reading zero now
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for MonotonicClock {
    fn now(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

/// Manually driven clock for tests and replay
#[derive(Debug, Clone, Default)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    /// Clock stopped at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Jump to `timestamp`
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Move forward by `ms`
    pub fn advance(&mut self, ms: u64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }
}

/// Sleep for the rest of a cycle, never less than `min_sleep_ms`
pub fn remaining_sleep_ms(period_ms: u32, elapsed_ms: u64, min_sleep_ms: u32) -> u64 {
    (period_ms as u64).saturating_sub(elapsed_ms).max(min_sleep_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_advances() {
        let mut time = FixedTime::new(1000);
        assert_eq!(time.now(), 1000);

        time.advance(500);
        assert_eq!(time.now(), 1500);
        assert_eq!(time.elapsed_since(1200), 300);

        time.set(100);
        assert_eq!(time.elapsed_since(1200), 0);
    }

    #[test]
    fn sleep_is_floored() {
        assert_eq!(remaining_sleep_ms(200, 35, 10), 165);
        assert_eq!(remaining_sleep_ms(200, 195, 10), 10);
        assert_eq!(remaining_sleep_ms(200, 900, 10), 10);
    }

    #[cfg(feature = "std")]
    #[test]
    fn monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now() >= start + 5);
    }
}

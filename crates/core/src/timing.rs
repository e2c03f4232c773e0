//! Monotonic timing for TTFT/TPOT measurement
//!
//! Wraps quanta for low-overhead monotonic timestamps. All externally visible
//! latencies are integer milliseconds truncated from the raw duration.

use std::time::Duration;

/// Monotonic clock used for all per-request latency measurements
#[derive(Clone)]
pub struct Clock {
    clock: quanta::Clock,
}

impl Clock {
    /// Create a new monotonic clock
    pub fn new() -> Self {
        Self {
            clock: quanta::Clock::new(),
        }
    }

    /// Get the current timestamp
    #[inline]
    pub fn now(&self) -> Timestamp {
        Timestamp {
            instant: self.clock.now(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    instant: quanta::Instant,
}

impl Timestamp {
    /// Duration between two timestamps; zero if `earlier` is not earlier
    #[inline]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        self.instant.duration_since(earlier.instant)
    }

    /// Whole milliseconds elapsed since `earlier`, truncated
    #[inline]
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.duration_since(earlier).as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = Clock::new();
        let t1 = clock.now();
        thread::sleep(Duration::from_micros(100));
        let t2 = clock.now();

        assert!(t2 > t1);
        assert!(t2.duration_since(t1).as_micros() >= 100);
    }

    #[test]
    fn test_millis_truncation() {
        let clock = Clock::new();
        let t1 = clock.now();
        thread::sleep(Duration::from_millis(2));
        let t2 = clock.now();

        assert!(t2.millis_since(t1) >= 2);
        // Reversed order saturates at zero instead of panicking.
        assert_eq!(t1.millis_since(t2), 0);
    }
}

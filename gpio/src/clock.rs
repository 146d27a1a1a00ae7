//! Millisecond clocks for the scan loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use crate::key::Millis;

/// A monotonic millisecond counter that wraps at its integer width.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Milliseconds elapsed since the clock was created.
#[derive(Copy, Clone, Debug)]
pub struct MonotonicClock {
    origin: Instant,
    offset: Millis,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Creates a clock whose first reading is `offset`, e.g. just below the wrap point.
    pub fn with_offset(offset: Millis) -> Self {
        Self {
            origin: Instant::now(),
            offset,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> Millis {
        // Truncating to 32 bits is the wraparound.
        let elapsed = self.origin.elapsed().as_millis() as Millis;
        self.offset.wrapping_add(elapsed)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start)),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Moves the clock forward, wrapping like a hardware counter.
    pub fn advance(&self, ms: Millis) {
        // fetch_add on atomics wraps on overflow.
        self.now.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::elapsed_ms;

    #[test]
    fn test_manual_clock_wraps() {
        let clock = ManualClock::new(Millis::MAX - 5);
        let before = clock.now_ms();
        clock.advance(10);
        assert_eq!(clock.now_ms(), 4);
        assert_eq!(elapsed_ms(before, clock.now_ms()), 10);
    }

    #[test]
    fn test_monotonic_clock_offset() {
        let clock = MonotonicClock::with_offset(Millis::MAX);
        let now = clock.now_ms();
        // Either still at the offset or already wrapped past zero.
        assert!(now == Millis::MAX || now < 1000);
        assert!(elapsed_ms(Millis::MAX, now) < 1000);
    }
}

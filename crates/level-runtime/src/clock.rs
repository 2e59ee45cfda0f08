//! Free-running cycle counters for timeout detection in the sampler.
//!
//! The sampler measures inactivity in counter cycles rather than OS ticks so
//! that the check costs one counter read. Counters are 32 bits wide and wrap;
//! spans must always be computed with [`Cycles::wrapping_sub`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Raw counter value.
pub type Cycles = u32;

/// Source of a monotonically increasing, wrapping cycle count.
pub trait CycleClock: Send {
    /// Current counter value.
    fn now(&self) -> Cycles;

    /// Counter frequency in Hz.
    fn frequency_hz(&self) -> u64;

    /// Convert a duration into counter cycles at nanosecond precision.
    ///
    /// Saturates at `Cycles::MAX`.
    fn duration_to_cycles(&self, duration: Duration) -> Cycles {
        let cycles = duration.as_nanos() * u128::from(self.frequency_hz()) / 1_000_000_000;
        Cycles::try_from(cycles).unwrap_or(Cycles::MAX)
    }

    /// Cycles elapsed since `earlier`, correct across one wraparound.
    #[inline]
    fn cycles_since(&self, earlier: Cycles) -> Cycles {
        self.now().wrapping_sub(earlier)
    }

    /// Give up the CPU for `duration`.
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cycle counter derived from the host monotonic clock.
///
/// Counts at `frequency_hz` from the moment of construction and wraps at
/// 32 bits, like a hardware CCOUNT register.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    frequency_hz: u64,
}

impl MonotonicClock {
    /// Create a clock counting at `frequency_hz`.
    pub fn new(frequency_hz: u64) -> Self {
        Self {
            origin: Instant::now(),
            frequency_hz: frequency_hz.max(1),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(1_000_000_000)
    }
}

impl CycleClock for MonotonicClock {
    #[inline]
    fn now(&self) -> Cycles {
        let nanos = self.origin.elapsed().as_nanos();
        // Truncation is the wraparound.
        (nanos * u128::from(self.frequency_hz) / 1_000_000_000) as Cycles
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same counter, so a test can keep one handle while the
/// sampler owns another. `sleep` does not block; it advances the counter by
/// the slept duration and records the call.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Arc<AtomicU32>,
    step: Cycles,
    frequency_hz: u64,
    sleeps: Arc<AtomicU64>,
    slept_ns: Arc<AtomicU64>,
}

impl FakeClock {
    /// Create a clock at cycle 0 counting at `frequency_hz`.
    pub fn new(frequency_hz: u64) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(0)),
            step: 0,
            frequency_hz: frequency_hz.max(1),
            sleeps: Arc::new(AtomicU64::new(0)),
            slept_ns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the counter by `step` cycles on every `now()` call.
    #[must_use]
    pub fn with_auto_step(mut self, step: Cycles) -> Self {
        self.step = step;
        self
    }

    /// Set the counter.
    pub fn set(&self, cycles: Cycles) {
        self.now.store(cycles, Ordering::SeqCst);
    }

    /// Advance the counter, wrapping at 32 bits.
    pub fn advance(&self, cycles: Cycles) {
        // fetch_add on atomics wraps on overflow
        self.now.fetch_add(cycles, Ordering::SeqCst);
    }

    /// Advance the counter by a wall-clock duration.
    pub fn advance_by(&self, duration: Duration) {
        self.advance(self.duration_to_cycles(duration));
    }

    /// Counter value without stepping.
    pub fn peek(&self) -> Cycles {
        self.now.load(Ordering::SeqCst)
    }

    /// Number of `sleep` calls so far.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }

    /// Total duration passed to `sleep`.
    pub fn total_slept(&self) -> Duration {
        Duration::from_nanos(self.slept_ns.load(Ordering::SeqCst))
    }
}

impl CycleClock for FakeClock {
    fn now(&self) -> Cycles {
        if self.step == 0 {
            self.peek()
        } else {
            self.now.fetch_add(self.step, Ordering::SeqCst)
        }
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.slept_ns
            .fetch_add(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX), Ordering::SeqCst);
        self.advance_by(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_to_cycles() {
        let clock = FakeClock::new(40_000_000);
        assert_eq!(clock.duration_to_cycles(Duration::from_secs(1)), 40_000_000);
        assert_eq!(clock.duration_to_cycles(Duration::from_millis(1)), 40_000);
        assert_eq!(clock.duration_to_cycles(Duration::ZERO), 0);

        let fast = FakeClock::new(240_000_000);
        assert_eq!(fast.duration_to_cycles(Duration::from_secs(1)), 240_000_000);
    }

    #[test]
    fn test_duration_to_cycles_keeps_sub_millisecond_precision() {
        let clock = FakeClock::new(1_000_000);
        assert_eq!(clock.duration_to_cycles(Duration::from_micros(500)), 500);
        assert_eq!(clock.duration_to_cycles(Duration::from_nanos(999)), 0);
        assert_eq!(clock.duration_to_cycles(Duration::from_secs(1)), 1_000_000);

        let fast = FakeClock::new(1_000_000_000);
        assert_eq!(fast.duration_to_cycles(Duration::from_secs(10)), Cycles::MAX);
    }

    #[test]
    fn test_cycles_since_across_wraparound() {
        let clock = FakeClock::new(1_000);
        clock.set(Cycles::MAX - 10);
        let start = clock.now();

        clock.advance(25);
        assert_eq!(clock.peek(), 14);
        assert_eq!(clock.cycles_since(start), 25);
    }

    #[test]
    fn test_fake_clock_auto_step() {
        let clock = FakeClock::new(1_000).with_auto_step(5);
        assert_eq!(clock.now(), 0);
        assert_eq!(clock.now(), 5);
        assert_eq!(clock.peek(), 10);
    }

    #[test]
    fn test_fake_sleep_advances_time() {
        let clock = FakeClock::new(1_000_000);
        clock.sleep(Duration::from_millis(10));
        assert_eq!(clock.peek(), 10_000);
        assert_eq!(clock.sleep_count(), 1);
        assert_eq!(clock.total_slept(), Duration::from_millis(10));
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new(1_000_000_000);
        let start = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.cycles_since(start) >= 1_000_000);
        assert_eq!(clock.duration_to_cycles(Duration::from_secs(1)), 1_000_000_000);
    }
}

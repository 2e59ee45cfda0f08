//! In-process stand-in for the level indicator.
//!
//! Drives the same multiplexed protocol as the real display: each digit is
//! enabled in turn for one dwell period while its value sits on the value
//! lines, with leading zeros shown as blank digits.

use crate::DigitBus;
use level_common::config::SimulatedConfig;
use level_common::{BusSnapshot, DigitSlot, LevelResult, Reading, BLANK_DIGIT, DIGIT_COUNT};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Digits the display shows for `level`, hundreds first.
///
/// With `blank_leading_zeros` the display suppresses zeros before the first
/// significant digit; the units digit is always shown.
#[must_use]
pub fn display_digits(level: u16, blank_leading_zeros: bool) -> [u8; DIGIT_COUNT] {
    let level = Reading::saturating(level).value();
    let mut digits = [
        (level / 100) as u8,
        ((level / 10) % 10) as u8,
        (level % 10) as u8,
    ];

    if blank_leading_zeros {
        for digit in digits.iter_mut().take(DIGIT_COUNT - 1) {
            if *digit != 0 {
                break;
            }
            *digit = BLANK_DIGIT;
        }
    }

    digits
}

/// Shared handle for changing the simulated level while the sampler runs.
#[derive(Debug, Clone)]
pub struct IndicatorHandle {
    level: Arc<AtomicU16>,
}

impl IndicatorHandle {
    /// Change the displayed level (saturates at 999).
    pub fn set_level(&self, level: u16) {
        self.level
            .store(Reading::saturating(level).value(), Ordering::Relaxed);
    }

    /// Currently displayed level.
    pub fn level(&self) -> u16 {
        self.level.load(Ordering::Relaxed)
    }
}

/// Simulated multiplexed display.
#[derive(Debug)]
pub struct SimulatedIndicator {
    level: Arc<AtomicU16>,
    dwell: Duration,
    blank_leading_zeros: bool,
    start: Instant,
    initialized: bool,
}

impl SimulatedIndicator {
    /// Create an indicator showing `level` with the given per-digit dwell.
    pub fn new(level: u16, dwell: Duration) -> Self {
        Self {
            level: Arc::new(AtomicU16::new(Reading::saturating(level).value())),
            dwell: dwell.max(Duration::from_micros(1)),
            blank_leading_zeros: true,
            start: Instant::now(),
            initialized: false,
        }
    }

    /// Create an indicator from configuration.
    pub fn from_config(config: &SimulatedConfig) -> Self {
        let mut indicator = Self::new(config.level, config.digit_dwell);
        indicator.blank_leading_zeros = config.blank_leading_zeros;
        indicator
    }

    /// Handle for changing the level from another thread.
    pub fn handle(&self) -> IndicatorHandle {
        IndicatorHandle {
            level: Arc::clone(&self.level),
        }
    }

    /// Frame the display drives `elapsed` after power-on.
    pub fn frame_at(&self, elapsed: Duration) -> BusSnapshot {
        let pass = elapsed.as_nanos() / self.dwell.as_nanos();
        // `pass % 3` is always a valid slot index
        let slot = DigitSlot::from_index((pass % DIGIT_COUNT as u128) as usize)
            .unwrap_or(DigitSlot::Units);
        let digits = display_digits(self.level.load(Ordering::Relaxed), self.blank_leading_zeros);
        BusSnapshot::compose(slot, digits[slot.index()])
    }
}

impl DigitBus for SimulatedIndicator {
    fn init(&mut self) -> LevelResult<()> {
        self.start = Instant::now();
        self.initialized = true;
        debug!(
            dwell_us = self.dwell.as_micros(),
            level = self.level.load(Ordering::Relaxed),
            "Simulated indicator powered on"
        );
        Ok(())
    }

    #[inline]
    fn read_snapshot(&mut self) -> BusSnapshot {
        if !self.initialized {
            return BusSnapshot::IDLE;
        }
        self.frame_at(self.start.elapsed())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

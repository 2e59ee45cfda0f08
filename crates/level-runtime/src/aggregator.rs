//! Periodic aggregation of latched digits into a published reading.
//!
//! [`LevelAggregator::update`] is driven by an external scheduler on a slow
//! cadence (seconds). It only samples the latches and never waits on the
//! sampler.

use crate::latch::DigitLatchSet;
use level_common::Reading;
use std::sync::Arc;
use tracing::debug;

/// Destination of published readings.
pub trait ReadingSink: Send {
    /// Accept one reading. Publishing cannot fail from the caller's view.
    fn publish(&mut self, reading: Reading);
}

impl<F> ReadingSink for F
where
    F: FnMut(Reading) + Send,
{
    fn publish(&mut self, reading: Reading) {
        self(reading);
    }
}

/// Combines the three latched digits into a reading on every tick.
pub struct LevelAggregator<S: ReadingSink> {
    latches: Arc<DigitLatchSet>,
    sink: S,
    ticks: u64,
    last: Option<Reading>,
}

impl<S: ReadingSink> std::fmt::Debug for LevelAggregator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelAggregator")
            .field("latches", &self.latches)
            .field("ticks", &self.ticks)
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

impl<S: ReadingSink> LevelAggregator<S> {
    /// Create an aggregator reading `latches` and publishing to `sink`.
    pub fn new(latches: Arc<DigitLatchSet>, sink: S) -> Self {
        Self {
            latches,
            sink,
            ticks: 0,
            last: None,
        }
    }

    /// Compute the current reading and publish it.
    ///
    /// Blank digits count as zero. The three slots are read independently,
    /// so a reading may mix digits from different display passes.
    pub fn update(&mut self) -> Reading {
        let latches = self.latches.snapshot();
        let reading = Reading::from_latches(latches);

        self.ticks += 1;
        if self.last != Some(reading) {
            debug!(?latches, %reading, previous = ?self.last.map(Reading::value), "Reading changed");
        }
        self.last = Some(reading);

        self.sink.publish(reading);
        reading
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Most recently published reading.
    pub fn last_reading(&self) -> Option<Reading> {
        self.last
    }

    /// The sink readings are published to.
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

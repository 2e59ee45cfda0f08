//! Tight-poll sampling loop for the multiplexed display.
//!
//! Each iteration:
//! 1. Read one bus snapshot
//! 2. If it differs from the previous one, latch every enabled digit and
//!    record the change time
//! 3. If nothing changed for longer than the idle timeout, reset the change
//!    time and sleep briefly so other work can run
//! 4. Remember the snapshot and repeat
//!
//! The loop never blocks except for the bounded idle sleep. Tight polling
//! resumes on the next iteration after a sleep, with no transition needed
//! to wake it.

use crate::clock::{CycleClock, Cycles};
use crate::decode::{decode, Transition};
use crate::latch::DigitLatchSet;
use level_bus::DigitBus;
use level_common::config::SamplerConfig;
use level_common::BusSnapshot;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// State the sampler was in at the end of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    /// Normal tight polling.
    Running,
    /// The iteration ended with a voluntary idle sleep.
    IdleYield,
}

/// When and how long the sampler yields during inactivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    /// Inactivity window before a yield.
    pub timeout: Duration,
    /// Length of each yield.
    pub sleep: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            sleep: Duration::from_millis(10),
        }
    }
}

impl From<&SamplerConfig> for IdlePolicy {
    fn from(config: &SamplerConfig) -> Self {
        Self {
            timeout: config.idle_timeout,
            sleep: config.idle_sleep,
        }
    }
}

/// Lock-free sampler counters.
///
/// Written only by the sampler thread, readable from anywhere.
#[derive(Debug, Default)]
pub struct SamplerStats {
    iterations: AtomicU64,
    transitions: AtomicU64,
    latch_writes: AtomicU64,
    ghosted_frames: AtomicU64,
    idle_yields: AtomicU64,
}

/// Point-in-time copy of [`SamplerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SamplerCounters {
    /// Loop iterations (bus reads).
    pub iterations: u64,
    /// Snapshots that differed from their predecessor.
    pub transitions: u64,
    /// Individual slot updates.
    pub latch_writes: u64,
    /// Frames with more than one enable line asserted.
    pub ghosted_frames: u64,
    /// Idle sleeps taken.
    pub idle_yields: u64,
}

impl SamplerStats {
    /// Read all counters. Counters are loaded one by one.
    pub fn snapshot(&self) -> SamplerCounters {
        SamplerCounters {
            iterations: self.iterations.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            latch_writes: self.latch_writes.load(Ordering::Relaxed),
            ghosted_frames: self.ghosted_frames.load(Ordering::Relaxed),
            idle_yields: self.idle_yields.load(Ordering::Relaxed),
        }
    }
}

/// Single-writer increment; a plain load/store avoids a locked RMW in the hot loop.
#[inline]
fn bump(counter: &AtomicU64) {
    counter.store(counter.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
}

/// Continuously decodes the digit bus into a [`DigitLatchSet`].
pub struct SamplingLoop<B: DigitBus, C: CycleClock> {
    bus: B,
    clock: C,
    latches: Arc<DigitLatchSet>,
    stats: Arc<SamplerStats>,
    previous: BusSnapshot,
    last_change: Cycles,
    idle_timeout: Cycles,
    idle_sleep: Duration,
}

impl<B: DigitBus, C: CycleClock> std::fmt::Debug for SamplingLoop<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingLoop")
            .field("bus", &self.bus.name())
            .field("previous", &self.previous)
            .field("last_change", &self.last_change)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl<B: DigitBus, C: CycleClock> SamplingLoop<B, C> {
    /// Create a sampler writing into `latches`.
    ///
    /// The bus must already be initialized. The inactivity window starts at
    /// construction time.
    pub fn new(bus: B, clock: C, latches: Arc<DigitLatchSet>, policy: IdlePolicy) -> Self {
        // A zero window would yield on every read, even while the bus is busy.
        let idle_timeout = clock.duration_to_cycles(policy.timeout).max(1);
        let last_change = clock.now();

        Self {
            bus,
            clock,
            latches,
            stats: Arc::new(SamplerStats::default()),
            previous: BusSnapshot::IDLE,
            last_change,
            idle_timeout,
            idle_sleep: policy.sleep,
        }
    }

    /// Shared latch set this sampler writes.
    pub fn latches(&self) -> &Arc<DigitLatchSet> {
        &self.latches
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<SamplerStats> {
        &self.stats
    }

    /// Idle timeout in clock cycles.
    pub fn idle_timeout_cycles(&self) -> Cycles {
        self.idle_timeout
    }

    /// Run one iteration of the loop.
    #[inline]
    pub fn step(&mut self) -> SamplerState {
        let snapshot = self.bus.read_snapshot();
        bump(&self.stats.iterations);

        let transition = decode(self.previous, snapshot);
        if transition.is_change() {
            for (slot, value) in transition.latches() {
                self.latches.set(slot, value);
                bump(&self.stats.latch_writes);
            }
            if let Transition::Ghosted { mask, value } = transition {
                bump(&self.stats.ghosted_frames);
                trace!(mask, value, "Multiple digits enabled");
            }
            bump(&self.stats.transitions);
            trace!(%snapshot, ?transition, "Bus transition");
            self.last_change = self.clock.now();
        }

        let state = if self.clock.cycles_since(self.last_change) > self.idle_timeout {
            // Restarts the window, so the next yield is a full timeout away
            // even if the bus stays quiet.
            self.last_change = self.clock.now();
            bump(&self.stats.idle_yields);
            self.clock.sleep(self.idle_sleep);
            SamplerState::IdleYield
        } else {
            SamplerState::Running
        };

        self.previous = snapshot;
        state
    }

    /// Poll until `stop` is set.
    pub fn run_until(&mut self, stop: &AtomicBool) {
        info!(
            bus = self.bus.name(),
            idle_timeout_cycles = self.idle_timeout,
            idle_sleep_ms = self.idle_sleep.as_millis(),
            "Sampler running"
        );

        while !stop.load(Ordering::Relaxed) {
            self.step();
        }

        let counters = self.stats.snapshot();
        debug!(?counters, "Sampler stopped");
    }
}

//! One-time startup of the monitor.
//!
//! [`start`] brings up the bus, creates the shared latch set, and launches
//! the sampler on its own thread. The returned [`LevelMonitor`] is the
//! explicit handle through which aggregators reach the latches.

use crate::aggregator::{LevelAggregator, ReadingSink};
use crate::clock::{CycleClock, MonotonicClock};
use crate::latch::DigitLatchSet;
use crate::realtime::{apply_thread_placement, PlacementStatus};
use crate::sampler::{IdlePolicy, SamplerCounters, SamplerStats, SamplingLoop};
use level_bus::DigitBus;
use level_common::config::LevelConfig;
use level_common::error::{LevelError, LevelResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Name of the sampler thread.
pub const SAMPLER_THREAD_NAME: &str = "level-sampler";

/// Handle to a running monitor.
///
/// Dropping the handle stops and joins the sampler thread.
#[derive(Debug)]
pub struct LevelMonitor {
    latches: Arc<DigitLatchSet>,
    stats: Arc<SamplerStats>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    placement: PlacementStatus,
}

/// Configure the bus and launch the sampler.
///
/// Call once per process. The sampler uses a host cycle counter running at
/// `config.sampler.clock_hz`.
///
/// # Errors
///
/// Fails if the configuration is invalid, the bus cannot be brought up, or
/// the sampler thread cannot be spawned or placed. None of these are
/// retried.
pub fn start<B>(config: &LevelConfig, bus: B) -> LevelResult<LevelMonitor>
where
    B: DigitBus + 'static,
{
    let clock = MonotonicClock::new(config.sampler.clock_hz);
    start_with_clock(config, bus, clock)
}

/// [`start`] with an explicit cycle clock.
///
/// # Errors
///
/// Same as [`start`].
pub fn start_with_clock<B, C>(
    config: &LevelConfig,
    mut bus: B,
    clock: C,
) -> LevelResult<LevelMonitor>
where
    B: DigitBus + 'static,
    C: CycleClock + 'static,
{
    config.validate()?;

    info!(bus = bus.name(), "Setting up digit bus");
    bus.init().map_err(|e| {
        error!(bus = bus.name(), error = %e, "Digit bus setup failed");
        e
    })?;

    let latches = Arc::new(DigitLatchSet::new());
    let mut sampler = SamplingLoop::new(
        bus,
        clock,
        Arc::clone(&latches),
        IdlePolicy::from(&config.sampler),
    );
    let stats = Arc::clone(sampler.stats());
    let stop = Arc::new(AtomicBool::new(false));

    let thread_config = config.sampler.thread.clone();
    let thread_stop = Arc::clone(&stop);
    let (placed_tx, placed_rx) = mpsc::channel::<LevelResult<PlacementStatus>>();

    let handle = thread::Builder::new()
        .name(SAMPLER_THREAD_NAME.into())
        .stack_size(thread_config.stack_size)
        .spawn(move || {
            let placement = apply_thread_placement(&thread_config);
            let placed = placement.is_ok();
            // The receiver only goes away if startup was abandoned.
            let _ = placed_tx.send(placement);
            if placed {
                sampler.run_until(&thread_stop);
            }
        })
        .map_err(|e| LevelError::Thread(format!("failed to spawn sampler thread: {e}")))?;

    let placement = match placed_rx.recv() {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            error!(error = %e, "Sampler thread placement failed");
            let _ = handle.join();
            return Err(e);
        }
        Err(_) => {
            let _ = handle.join();
            return Err(LevelError::Thread(
                "sampler thread exited before reporting placement".into(),
            ));
        }
    };

    info!(thread = SAMPLER_THREAD_NAME, ?placement, "Sampler started");

    Ok(LevelMonitor {
        latches,
        stats,
        stop,
        handle: Some(handle),
        placement,
    })
}

impl LevelMonitor {
    /// Create an aggregator over this monitor's latches.
    pub fn aggregator<S: ReadingSink>(&self, sink: S) -> LevelAggregator<S> {
        LevelAggregator::new(Arc::clone(&self.latches), sink)
    }

    /// The shared latch set.
    pub fn latches(&self) -> &Arc<DigitLatchSet> {
        &self.latches
    }

    /// Current sampler counters.
    pub fn counters(&self) -> SamplerCounters {
        self.stats.snapshot()
    }

    /// Placement applied to the sampler thread.
    pub fn placement(&self) -> &PlacementStatus {
        &self.placement
    }

    /// Whether the sampler thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the sampler and wait for its thread to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the sampler thread panicked.
    pub fn shutdown(mut self) -> LevelResult<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> LevelResult<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            debug!("Joining sampler thread");
            handle
                .join()
                .map_err(|_| LevelError::Thread("sampler thread panicked".into()))?;
            info!(counters = ?self.stats.snapshot(), "Sampler stopped");
        }
        Ok(())
    }
}

impl Drop for LevelMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            warn!("Sampler shutdown failed: {e}");
        }
    }
}

//! Digit bus drivers for the multiplexed level display.
//!
//! This crate provides:
//! - [`DigitBus`] trait for reading a synchronized snapshot of the display lines
//! - [`simulated`] module with an in-process indicator that multiplexes a level
//! - [`ScriptedBus`] for replaying recorded frames
//! - `gpio_cdev` module (Linux) reading the lines through a GPIO character device

pub mod simulated;

#[cfg(target_os = "linux")]
pub mod gpio_cdev;

pub use simulated::*;

#[cfg(target_os = "linux")]
pub use gpio_cdev::*;

use level_common::config::{BusConfig, BusDriver};
use level_common::{BusSnapshot, LevelError, LevelResult};
use tracing::info;

/// Digit bus abstraction.
///
/// A bus is brought up once with [`DigitBus::init`] and then read in a tight
/// loop. Reads have no failure mode: a driver that loses the hardware after
/// setup keeps returning its last good snapshot.
pub trait DigitBus: Send {
    /// Configure the underlying lines.
    ///
    /// Failure here is fatal for monitor startup and is not retried.
    fn init(&mut self) -> LevelResult<()>;

    /// Sample every monitored line at one instant.
    ///
    /// Lines must be read together so that a snapshot never mixes the
    /// enable bits of one frame with the value bits of another.
    fn read_snapshot(&mut self) -> BusSnapshot;

    /// Short driver name for logs.
    fn name(&self) -> &'static str;
}

impl<B: DigitBus + ?Sized> DigitBus for Box<B> {
    fn init(&mut self) -> LevelResult<()> {
        (**self).init()
    }

    #[inline]
    fn read_snapshot(&mut self) -> BusSnapshot {
        (**self).read_snapshot()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Create the bus selected by configuration.
///
/// The returned bus is not yet initialized.
///
/// # Errors
///
/// Returns [`LevelError::Config`] if the driver is not available on this
/// platform.
pub fn bus_from_config(config: &BusConfig) -> LevelResult<Box<dyn DigitBus>> {
    match config.driver {
        BusDriver::Simulated => {
            info!(level = config.simulated.level, "Using simulated indicator");
            Ok(Box::new(SimulatedIndicator::from_config(&config.simulated)))
        }
        BusDriver::Scripted => {
            info!(
                frames = config.scripted.frames.len(),
                repeat = config.scripted.repeat,
                "Using scripted bus"
            );
            let frames = config.scripted.frames.iter().copied().map(BusSnapshot);
            Ok(Box::new(ScriptedBus::new(frames).repeat(config.scripted.repeat)))
        }
        BusDriver::GpioCdev => gpio_bus(config),
    }
}

#[cfg(target_os = "linux")]
fn gpio_bus(config: &BusConfig) -> LevelResult<Box<dyn DigitBus>> {
    info!(chip = ?config.gpio.chip, lines = ?config.gpio.lines(), "Using GPIO character device");
    Ok(Box::new(GpioCdevBus::new(config.gpio.clone())))
}

#[cfg(not(target_os = "linux"))]
fn gpio_bus(_config: &BusConfig) -> LevelResult<Box<dyn DigitBus>> {
    Err(LevelError::Config(
        "gpio_cdev bus driver is only available on Linux".into(),
    ))
}

/// Bus that replays a fixed list of frames, one per read.
///
/// After the last frame the bus holds it (or starts over with
/// [`ScriptedBus::repeat`]). An empty script reads as [`BusSnapshot::IDLE`].
#[derive(Debug, Default)]
pub struct ScriptedBus {
    frames: Vec<BusSnapshot>,
    position: usize,
    repeat: bool,
    reads: u64,
    initialized: bool,
}

impl ScriptedBus {
    /// Create a bus replaying `frames` in order.
    pub fn new(frames: impl IntoIterator<Item = BusSnapshot>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Loop back to the first frame after the last one.
    #[must_use]
    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Number of snapshots handed out so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Whether every frame has been read at least once.
    pub fn exhausted(&self) -> bool {
        self.position >= self.frames.len()
    }

    /// Whether [`DigitBus::init`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl DigitBus for ScriptedBus {
    fn init(&mut self) -> LevelResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn read_snapshot(&mut self) -> BusSnapshot {
        self.reads += 1;

        if self.frames.is_empty() {
            return BusSnapshot::IDLE;
        }

        if self.position >= self.frames.len() {
            if self.repeat {
                self.position = 0;
            } else {
                return self.frames[self.frames.len() - 1];
            }
        }

        let frame = self.frames[self.position];
        self.position += 1;
        frame
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Bus whose bring-up always fails, for exercising startup error paths.
#[derive(Debug, Clone)]
pub struct UnavailableBus {
    reason: String,
}

impl UnavailableBus {
    /// Create a bus that fails `init` with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl DigitBus for UnavailableBus {
    fn init(&mut self) -> LevelResult<()> {
        Err(LevelError::BusSetup(self.reason.clone()))
    }

    fn read_snapshot(&mut self) -> BusSnapshot {
        BusSnapshot::IDLE
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

//! Linux GPIO character-device bus.
//!
//! All seven display lines are requested in a single line handle, and each
//! snapshot is one `GPIOHANDLE_GET_LINE_VALUES` ioctl. The kernel samples
//! every line of a handle in that one call, so a snapshot cannot mix lines
//! from different display frames.

use crate::DigitBus;
use level_common::config::GpioConfig;
use level_common::{BusSnapshot, LevelError, LevelResult, BUS_WIDTH};
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Log every Nth failed read once the first one has been reported.
const READ_FAILURE_LOG_INTERVAL: u64 = 100_000;

/// Kernel ABI from `<linux/gpio.h>` (v1 line handles).
mod sys {
    /// Maximum lines in one kernel line handle.
    pub const GPIOHANDLES_MAX: usize = 64;

    /// Request lines as inputs.
    pub const GPIOHANDLE_REQUEST_INPUT: u32 = 1 << 0;

    /// `struct gpiohandle_request`.
    #[repr(C)]
    pub struct GpioHandleRequest {
        pub line_offsets: [u32; GPIOHANDLES_MAX],
        pub flags: u32,
        pub default_values: [u8; GPIOHANDLES_MAX],
        pub consumer_label: [u8; 32],
        pub lines: u32,
        pub fd: libc::c_int,
    }

    /// `struct gpiohandle_data`.
    #[repr(C)]
    pub struct GpioHandleData {
        pub values: [u8; GPIOHANDLES_MAX],
    }

    nix::ioctl_readwrite!(gpio_get_linehandle, 0xB4, 0x03, GpioHandleRequest);
    nix::ioctl_readwrite!(gpiohandle_get_line_values, 0xB4, 0x08, GpioHandleData);
}

use sys::{GpioHandleData, GpioHandleRequest, GPIOHANDLES_MAX, GPIOHANDLE_REQUEST_INPUT};

/// Failures while bringing up the GPIO lines.
#[derive(Debug, Error)]
pub enum GpioError {
    /// The chip device node could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        /// Chip device path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The kernel rejected the line request.
    #[error("line request {lines:?} on {path} failed: {source}")]
    Request {
        /// Chip device path.
        path: PathBuf,
        /// Requested line offsets.
        lines: Vec<u32>,
        /// Errno returned by the ioctl.
        #[source]
        source: nix::errno::Errno,
    },

    /// Wrong number of lines configured.
    #[error("expected 7 lines, got {0}")]
    LineCount(usize),
}

impl From<GpioError> for LevelError {
    fn from(err: GpioError) -> Self {
        LevelError::BusSetup(err.to_string())
    }
}

/// Digit bus backed by `/dev/gpiochipN`.
#[derive(Debug)]
pub struct GpioCdevBus {
    config: GpioConfig,
    handle: Option<OwnedFd>,
    last: BusSnapshot,
    read_failures: u64,
}

impl GpioCdevBus {
    /// Create a bus for the configured chip and lines. Nothing is opened
    /// until [`DigitBus::init`].
    pub fn new(config: GpioConfig) -> Self {
        Self {
            config,
            handle: None,
            last: BusSnapshot::IDLE,
            read_failures: 0,
        }
    }

    /// Number of reads that failed after setup.
    pub fn read_failures(&self) -> u64 {
        self.read_failures
    }

    fn request_lines(&self) -> Result<OwnedFd, GpioError> {
        let lines = self.config.lines();
        if lines.len() != BUS_WIDTH {
            return Err(GpioError::LineCount(lines.len()));
        }

        let chip = File::options()
            .read(true)
            .write(true)
            .open(&self.config.chip)
            .map_err(|source| GpioError::Open {
                path: self.config.chip.clone(),
                source,
            })?;

        let mut request = GpioHandleRequest {
            line_offsets: [0; GPIOHANDLES_MAX],
            flags: GPIOHANDLE_REQUEST_INPUT,
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: [0; 32],
            lines: BUS_WIDTH as u32,
            fd: -1,
        };
        request.line_offsets[..BUS_WIDTH].copy_from_slice(&lines);

        // Keep the trailing NUL
        let label = self.config.consumer.as_bytes();
        let label_len = label.len().min(request.consumer_label.len() - 1);
        request.consumer_label[..label_len].copy_from_slice(&label[..label_len]);

        // SAFETY: `chip` is an open gpiochip descriptor and `request` is a
        // properly laid out `gpiohandle_request` that outlives the call.
        unsafe { sys::gpio_get_linehandle(chip.as_raw_fd(), &mut request) }.map_err(|source| {
            GpioError::Request {
                path: self.config.chip.clone(),
                lines: lines.clone(),
                source,
            }
        })?;

        // SAFETY: on success the kernel stores a fresh descriptor we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(request.fd) })
    }
}

impl DigitBus for GpioCdevBus {
    fn init(&mut self) -> LevelResult<()> {
        debug!(chip = ?self.config.chip, lines = ?self.config.lines(), "Requesting GPIO lines");
        let handle = self.request_lines()?;
        info!(
            chip = ?self.config.chip,
            consumer = %self.config.consumer,
            "GPIO line handle acquired"
        );
        self.handle = Some(handle);
        Ok(())
    }

    fn read_snapshot(&mut self) -> BusSnapshot {
        let Some(handle) = self.handle.as_ref() else {
            return BusSnapshot::IDLE;
        };

        let mut data = GpioHandleData {
            values: [0; GPIOHANDLES_MAX],
        };

        // SAFETY: `handle` is the line handle returned by the kernel and
        // `data` is a properly laid out `gpiohandle_data`.
        match unsafe { sys::gpiohandle_get_line_values(handle.as_raw_fd(), &mut data) } {
            Ok(_) => {
                let mut lines = [false; BUS_WIDTH];
                for (line, value) in lines.iter_mut().zip(data.values.iter()) {
                    *line = *value != 0;
                }
                self.last = BusSnapshot::from_lines(&lines);
            }
            Err(e) => {
                self.read_failures += 1;
                if self.read_failures % READ_FAILURE_LOG_INTERVAL == 1 {
                    warn!(
                        error = %e,
                        failures = self.read_failures,
                        "GPIO line read failed, holding last snapshot"
                    );
                }
            }
        }

        self.last
    }

    fn name(&self) -> &'static str {
        "gpio_cdev"
    }
}

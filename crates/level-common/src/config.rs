//! Configuration structures for the water-level monitor.
//!
//! Supports TOML deserialization with defaults matching the reference
//! indicator wiring, so an empty file describes a working setup.

use crate::error::{LevelError, LevelResult};
use crate::protocol::{BUS_WIDTH, DIGIT_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// How the reading is presented to the monitoring layer.
    pub sensor: SensorConfig,

    /// Sampling loop tuning and thread placement.
    pub sampler: SamplerConfig,

    /// Digit bus driver selection.
    pub bus: BusConfig,
}

/// Published sensor description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Display name of the sensor.
    pub name: String,

    /// Unit of measurement attached to published readings.
    pub unit: String,

    /// Decimal places shown by consumers.
    pub accuracy_decimals: u8,

    /// Interval between aggregation ticks.
    #[serde(with = "humantime_serde")]
    pub update_interval: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: String::from("Water level"),
            unit: String::from("%"),
            accuracy_decimals: 0,
            update_interval: Duration::from_secs(60),
        }
    }
}

/// Sampling loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Inactivity window after which the sampler yields the CPU.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Length of each idle yield.
    #[serde(with = "humantime_serde")]
    pub idle_sleep: Duration,

    /// Frequency of the cycle counter used for timeout detection.
    pub clock_hz: u64,

    /// Sampler thread placement.
    pub thread: ThreadConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(10),
            clock_hz: 1_000_000_000,
            thread: ThreadConfig::default(),
        }
    }
}

/// Placement of the dedicated sampler thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// CPU the sampler is pinned to.
    pub cpu_affinity: CpuAffinity,

    /// Scheduler policy: "fifo", "rr" or "other".
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,

    /// Stack size of the sampler thread in bytes.
    pub stack_size: usize,

    /// Fail startup if pinning or scheduling cannot be applied.
    pub fail_fast: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            cpu_affinity: CpuAffinity::Single(1),
            policy: SchedPolicy::Other,
            priority: 1,
            stack_size: 64 * 1024,
            fail_fast: false,
        }
    }
}

/// Scheduler policy for the sampler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    #[default]
    Other,
}

/// CPU affinity specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No affinity set (OS chooses).
    #[default]
    None,
    /// Pin to a single CPU core.
    Single(usize),
    /// Pin to a set of CPU cores.
    Set(Vec<usize>),
}

impl Serialize for CpuAffinity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            CpuAffinity::None => serializer.serialize_str("none"),
            CpuAffinity::Single(cpu) => serializer.serialize_u64(*cpu as u64),
            CpuAffinity::Set(cpus) => cpus.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CpuAffinity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct CpuAffinityVisitor;

        impl<'de> Visitor<'de> for CpuAffinityVisitor {
            type Value = CpuAffinity;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("\"none\", an integer, or an array of integers")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::None)
            }

            // TOML has no null, so "none" stands in for it.
            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value.eq_ignore_ascii_case("none") {
                    Ok(CpuAffinity::None)
                } else {
                    Err(de::Error::invalid_value(de::Unexpected::Str(value), &self))
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::Single(value as usize))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(de::Error::custom("CPU index cannot be negative"));
                }
                Ok(CpuAffinity::Single(value as usize))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut cpus = Vec::new();
                while let Some(cpu) = seq.next_element::<usize>()? {
                    cpus.push(cpu);
                }
                Ok(CpuAffinity::Set(cpus))
            }
        }

        deserializer.deserialize_any(CpuAffinityVisitor)
    }
}

/// Digit bus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus driver type.
    pub driver: BusDriver,

    /// Linux GPIO character-device wiring.
    pub gpio: GpioConfig,

    /// Simulated indicator settings.
    pub simulated: SimulatedConfig,

    /// Recorded frame replay.
    pub scripted: ScriptedConfig,
}

/// Supported bus drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusDriver {
    /// In-process indicator simulation.
    #[default]
    Simulated,
    /// Linux GPIO character device (`/dev/gpiochipN`).
    GpioCdev,
    /// Replay of a fixed frame list.
    Scripted,
}

/// GPIO line assignment, in bus bit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// GPIO chip device node.
    pub chip: PathBuf,

    /// Consumer label reported to the kernel.
    pub consumer: String,

    /// Line offsets of the value bits A, B, C, D.
    pub value_lines: [u32; 4],

    /// Line offsets of the enable bits L1, L2, L3.
    pub enable_lines: [u32; DIGIT_COUNT],
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: PathBuf::from("/dev/gpiochip0"),
            consumer: String::from("water-level"),
            value_lines: [10, 7, 8, 9],
            enable_lines: [11, 12, 13],
        }
    }
}

impl GpioConfig {
    /// All line offsets in bus bit order (value bits first).
    #[must_use]
    pub fn lines(&self) -> Vec<u32> {
        self.value_lines
            .iter()
            .chain(self.enable_lines.iter())
            .copied()
            .collect()
    }
}

/// Simulated indicator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Level shown at startup.
    pub level: u16,

    /// How long each digit stays enabled per multiplex pass.
    #[serde(with = "humantime_serde")]
    pub digit_dwell: Duration,

    /// Show leading zeros as blank digits, like the real display.
    pub blank_leading_zeros: bool,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            level: 0,
            digit_dwell: Duration::from_millis(2),
            blank_leading_zeros: true,
        }
    }
}

/// Frame replay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedConfig {
    /// Raw snapshots, one per bus read.
    pub frames: Vec<u32>,

    /// Start over after the last frame instead of holding it.
    pub repeat: bool,
}

impl LevelConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check semantic constraints that the TOML schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`LevelError::Config`] describing the first violation.
    pub fn validate(&self) -> LevelResult<()> {
        if self.sensor.update_interval.is_zero() {
            return Err(LevelError::Config("sensor.update_interval must be non-zero".into()));
        }

        if self.sampler.idle_timeout.is_zero() {
            return Err(LevelError::Config("sampler.idle_timeout must be non-zero".into()));
        }

        if self.sampler.clock_hz == 0 {
            return Err(LevelError::Config("sampler.clock_hz must be non-zero".into()));
        }

        let timeout_cycles = self.sampler.idle_timeout.as_nanos()
            * u128::from(self.sampler.clock_hz)
            / 1_000_000_000;
        if timeout_cycles == 0 {
            return Err(LevelError::Config(format!(
                "sampler.idle_timeout of {} is shorter than one cycle at {} Hz",
                humantime::format_duration(self.sampler.idle_timeout),
                self.sampler.clock_hz
            )));
        }

        // Wrapping subtraction on a 32-bit counter only measures spans below 2^32.
        if timeout_cycles >= u128::from(u32::MAX) {
            return Err(LevelError::Config(format!(
                "sampler.idle_timeout of {} does not fit a 32-bit cycle counter at {} Hz",
                humantime::format_duration(self.sampler.idle_timeout),
                self.sampler.clock_hz
            )));
        }

        if self.bus.driver == BusDriver::GpioCdev {
            let lines = self.bus.gpio.lines();
            let unique: HashSet<u32> = lines.iter().copied().collect();
            if unique.len() != lines.len() {
                return Err(LevelError::Config(format!(
                    "bus.gpio lines must be distinct, got {lines:?}"
                )));
            }
        }

        if self.bus.simulated.level > 999 {
            return Err(LevelError::Config(format!(
                "bus.simulated.level {} exceeds the three-digit display",
                self.bus.simulated.level
            )));
        }

        if self.bus.driver == BusDriver::Scripted {
            if let Some(frame) = self.bus.scripted.frames.iter().find(|f| **f >> BUS_WIDTH != 0) {
                return Err(LevelError::Config(format!(
                    "bus.scripted frame {frame:#x} sets lines beyond the {BUS_WIDTH}-line bus"
                )));
            }
        }

        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

//! Water-level monitor daemon.
//!
//! Brings up the digit bus, starts the sampler thread, and publishes an
//! aggregated reading on every update tick until a shutdown signal arrives.

mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use level_bus::bus_from_config;
use level_common::config::{BusDriver, LevelConfig};
use level_runtime::{start, JsonLinesSink, LevelAggregator, LevelMonitor, LogSink, ReadingSink};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::signals::SignalHandler;

/// Environment variable naming a configuration file.
const CONFIG_ENV: &str = "LEVEL_CONFIG_PATH";

/// System-wide configuration file.
const SYSTEM_CONFIG_PATH: &str = "/etc/water-level/config.toml";

/// Configuration file used during local development.
const LOCAL_CONFIG_PATH: &str = "config/default.toml";

/// Ticks between sampler statistics log lines.
const STATS_EVERY_TICKS: u64 = 10;

/// Water-level daemon command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "water-level",
    about = "Water-level monitor - decodes a multiplexed 3-digit indicator",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Decode a simulated indicator instead of real hardware.
    #[arg(long, short = 's')]
    simulated: bool,

    /// Level shown by the simulated indicator (0-999).
    #[arg(long, value_name = "LEVEL")]
    level: Option<u16>,

    /// Interval between published readings (e.g. "5s", "1m").
    #[arg(long, value_name = "DURATION")]
    interval: Option<humantime::Duration>,

    /// Maximum readings to publish (0 = infinite).
    #[arg(long, default_value = "0")]
    max_ticks: u64,

    /// Write readings to stdout as JSON lines.
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting water-level monitor");

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    info!(
        sensor = %config.sensor.name,
        update_interval = %humantime::format_duration(config.sensor.update_interval),
        driver = ?config.bus.driver,
        "Configuration loaded"
    );

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    let bus = bus_from_config(&config.bus).context("Failed to create digit bus")?;
    let monitor = start(&config, bus).context("Failed to start sampler")?;
    let placement = monitor.placement();
    info!(
        policy = ?placement.scheduler_policy,
        priority = ?placement.scheduler_priority,
        cpus = ?placement.cpu_affinity,
        "Sampler placement"
    );

    let interval = config.sensor.update_interval;
    let ticks = if args.json {
        let sink = JsonLinesSink::new(std::io::stdout(), config.sensor.clone());
        run_ticks(&monitor, sink, &signal_handler, interval, args.max_ticks)
    } else {
        let sink = LogSink::new(config.sensor.name.clone());
        run_ticks(&monitor, sink, &signal_handler, interval, args.max_ticks)
    };

    info!("Shutting down...");
    let counters = monitor.counters();
    monitor.shutdown().context("Sampler did not stop cleanly")?;

    info!(
        ticks,
        sampler_iterations = counters.iterations,
        latch_writes = counters.latch_writes,
        idle_yields = counters.idle_yields,
        signals = signal_handler.state().signal_count(),
        "Daemon shutdown complete"
    );

    Ok(())
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "level_daemon={level},level_runtime={level},level_bus={level},level_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `LEVEL_CONFIG_PATH` environment variable
/// 3. `/etc/water-level/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(explicit: Option<&Path>) -> Result<LevelConfig> {
    if let Some(config_path) = explicit {
        info!(?config_path, "Loading config from command-line argument");
        return LevelConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from {CONFIG_ENV}");
            return LevelConfig::from_file(&config_path)
                .with_context(|| format!("Failed to load config from {CONFIG_ENV}={env_path:?}"));
        }
        warn!(
            path = %env_path,
            "{CONFIG_ENV} set but file does not exist, checking other locations"
        );
    }

    for candidate in [SYSTEM_CONFIG_PATH, LOCAL_CONFIG_PATH] {
        let config_path = Path::new(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config file");
            return LevelConfig::from_file(config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(LevelConfig::default())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut LevelConfig, args: &Args) {
    if args.simulated || args.level.is_some() {
        config.bus.driver = BusDriver::Simulated;
    }
    if let Some(level) = args.level {
        config.bus.simulated.level = level;
    }
    if let Some(interval) = args.interval {
        config.sensor.update_interval = interval.into();
    }
}

/// Publish a reading every `interval` until shutdown or `max_ticks`.
///
/// Deadlines are absolute, so slow sinks do not accumulate drift. Ticks that
/// are missed entirely are skipped rather than replayed.
fn run_ticks<S: ReadingSink>(
    monitor: &LevelMonitor,
    sink: S,
    signal_handler: &SignalHandler,
    interval: Duration,
    max_ticks: u64,
) -> u64 {
    let mut aggregator: LevelAggregator<S> = monitor.aggregator(sink);
    let mut deadline = Instant::now() + interval;

    info!(interval = %humantime::format_duration(interval), "Entering update loop");

    loop {
        if signal_handler.sleep_until(deadline) {
            info!("Shutdown signal received, leaving update loop");
            break;
        }

        if signal_handler.take_hangup() {
            info!("SIGHUP received, configuration reload is not supported");
        }

        let reading = aggregator.update();
        let ticks = aggregator.ticks();
        debug!(tick = ticks, value = reading.value(), "Tick");

        if !monitor.is_running() {
            warn!("Sampler thread is no longer running");
            signal_handler.request_shutdown();
            break;
        }

        if ticks % STATS_EVERY_TICKS == 0 {
            let counters = monitor.counters();
            match serde_json::to_string(&counters) {
                Ok(json) => info!(ticks, counters = %json, "Periodic status"),
                Err(e) => warn!(error = %e, "Failed to encode sampler counters"),
            }
        }

        if max_ticks > 0 && ticks >= max_ticks {
            info!(ticks, "Maximum tick count reached");
            break;
        }

        deadline += interval;
        let now = Instant::now();
        if deadline <= now {
            let behind = now - deadline;
            warn!(behind_ms = behind.as_millis(), "Update tick overran, skipping missed ticks");
            deadline = now + interval;
        }
    }

    aggregator.ticks()
}

#[cfg(test)]
mod tests {
    use super::*;
    use level_bus::SimulatedIndicator;
    use level_common::config::CpuAffinity;
    use level_runtime::RecordingSink;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["water-level", "--simulated"]);
        assert!(args.simulated);
        assert!(args.config.is_none());
        assert_eq!(args.max_ticks, 0);
        assert!(!args.json);
    }

    #[test]
    fn test_args_with_overrides() {
        let args = Args::parse_from([
            "water-level",
            "-c",
            "level.toml",
            "--level",
            "150",
            "--interval",
            "5s",
            "--max-ticks",
            "3",
            "--json",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("level.toml")));
        assert_eq!(args.level, Some(150));
        assert_eq!(args.max_ticks, 3);

        let mut config = LevelConfig::default();
        config.bus.driver = BusDriver::GpioCdev;
        apply_overrides(&mut config, &args);
        assert_eq!(config.bus.driver, BusDriver::Simulated);
        assert_eq!(config.bus.simulated.level, 150);
        assert_eq!(config.sensor.update_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("level.toml");
        std::fs::write(&path, "[sensor]\nname = \"Tank 2\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.sensor.name, "Tank 2");
        assert_eq!(config.sensor.unit, "%");
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_run_ticks_stops_at_max_ticks() {
        let mut config = LevelConfig::default();
        config.sampler.thread.cpu_affinity = CpuAffinity::None;

        let monitor = start(&config, SimulatedIndicator::new(321, Duration::from_millis(1))).unwrap();
        let signals = SignalHandler::new().unwrap();
        let recorder = RecordingSink::new();

        let ticks = run_ticks(
            &monitor,
            recorder.clone(),
            &signals,
            Duration::from_millis(20),
            3,
        );

        assert_eq!(ticks, 3);
        assert_eq!(recorder.readings().len(), 3);
        monitor.shutdown().unwrap();
    }
}

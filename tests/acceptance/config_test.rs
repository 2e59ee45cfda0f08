//! Configuration files driving a real startup.

use super::common::{eventually, SETTLE_TIMEOUT};
use level_bus::bus_from_config;
use level_common::config::{BusDriver, CpuAffinity, LevelConfig};
use level_common::{LevelError, Reading};
use level_runtime::start;
use std::io::Write;
use std::time::Duration;

const SCRIPTED_CONFIG: &str = r#"
[sensor]
name = "Roof tank"
unit = "cm"
update_interval = "5s"

[sampler]
idle_timeout = "250ms"
idle_sleep = "2ms"

[sampler.thread]
cpu_affinity = "none"

[bus]
driver = "scripted"

[bus.scripted]
# hundreds=3, tens=0, units=7
frames = [0x13, 0x20, 0x47]
repeat = true
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_scripted_config_file_runs_end_to_end() {
    let file = write_config(SCRIPTED_CONFIG);
    let config = LevelConfig::from_file(file.path()).unwrap();

    assert_eq!(config.sensor.name, "Roof tank");
    assert_eq!(config.sensor.update_interval, Duration::from_secs(5));
    assert_eq!(config.sampler.idle_timeout, Duration::from_millis(250));
    assert_eq!(config.sampler.thread.cpu_affinity, CpuAffinity::None);
    assert_eq!(config.bus.driver, BusDriver::Scripted);

    let bus = bus_from_config(&config.bus).unwrap();
    let monitor = start(&config, bus).unwrap();
    let mut aggregator = monitor.aggregator(|_r: Reading| {});

    assert!(eventually(SETTLE_TIMEOUT, || aggregator.update().value() == 307));
    monitor.shutdown().unwrap();
}

#[test]
fn test_empty_file_uses_defaults() {
    let file = write_config("");
    let config = LevelConfig::from_file(file.path()).unwrap();

    assert_eq!(config.sensor.name, "Water level");
    assert_eq!(config.sensor.unit, "%");
    assert_eq!(config.sensor.update_interval, Duration::from_secs(60));
    assert_eq!(config.sampler.thread.cpu_affinity, CpuAffinity::Single(1));
    assert_eq!(config.bus.gpio.lines(), vec![10, 7, 8, 9, 11, 12, 13]);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_values_are_rejected_at_startup() {
    let file = write_config(
        r#"
[sampler]
idle_timeout = "0s"

[sampler.thread]
cpu_affinity = "none"
"#,
    );
    let config = LevelConfig::from_file(file.path()).unwrap();
    let bus = bus_from_config(&config.bus).unwrap();

    assert!(matches!(start(&config, bus), Err(LevelError::Config(_))));
}

#[test]
fn test_malformed_file_reports_parse_error() {
    let file = write_config("[bus]\ndriver = \"carrier-pigeon\"\n");
    let err = LevelConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse TOML"));
}

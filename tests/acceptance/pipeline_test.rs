//! Full pipeline: indicator, sampler thread, latches, aggregator, sink.

use super::common::{eventually, unpinned_config, SETTLE_TIMEOUT};
use level_bus::{bus_from_config, SimulatedIndicator};
use level_common::config::BusDriver;
use level_common::Reading;
use level_runtime::{start, JsonLinesSink, RecordingSink};
use std::time::Duration;

#[test]
fn test_indicator_showing_150_publishes_150() {
    let indicator = SimulatedIndicator::new(150, Duration::from_millis(2));
    let monitor = start(&unpinned_config(), indicator).unwrap();

    let recorder = RecordingSink::new();
    let mut aggregator = monitor.aggregator(recorder.clone());

    assert!(eventually(SETTLE_TIMEOUT, || aggregator.update().value() == 150));

    // Once all three digits are latched the reading is stable.
    for _ in 0..20 {
        assert_eq!(aggregator.update(), Reading::saturating(150));
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(recorder.last(), Some(Reading::saturating(150)));

    let counters = monitor.counters();
    assert!(counters.latch_writes >= 3);
    assert_eq!(counters.ghosted_frames, 0);

    monitor.shutdown().unwrap();
}

#[test]
fn test_blanked_leading_digit_reads_as_zero() {
    let indicator = SimulatedIndicator::new(37, Duration::from_millis(1));
    let monitor = start(&unpinned_config(), indicator).unwrap();
    let mut aggregator = monitor.aggregator(|_r: Reading| {});

    assert!(eventually(SETTLE_TIMEOUT, || aggregator.update().value() == 37));
    monitor.shutdown().unwrap();
}

#[test]
fn test_level_change_is_followed() {
    let indicator = SimulatedIndicator::new(80, Duration::from_millis(1));
    let handle = indicator.handle();
    let monitor = start(&unpinned_config(), indicator).unwrap();
    let mut aggregator = monitor.aggregator(|_r: Reading| {});

    assert!(eventually(SETTLE_TIMEOUT, || aggregator.update().value() == 80));

    handle.set_level(999);
    assert!(eventually(SETTLE_TIMEOUT, || aggregator.update().value() == 999));

    handle.set_level(0);
    assert!(eventually(SETTLE_TIMEOUT, || aggregator.update().value() == 0));

    monitor.shutdown().unwrap();
}

#[test]
fn test_configured_simulated_bus_feeds_json_sink() {
    let mut config = unpinned_config();
    config.bus.driver = BusDriver::Simulated;
    config.bus.simulated.level = 642;
    config.sensor.name = "Cistern".into();

    let bus = bus_from_config(&config.bus).unwrap();
    let monitor = start(&config, bus).unwrap();

    let mut probe = monitor.aggregator(|_r: Reading| {});
    assert!(eventually(SETTLE_TIMEOUT, || probe.update().value() == 642));

    let mut aggregator = monitor.aggregator(JsonLinesSink::new(Vec::new(), config.sensor.clone()));
    aggregator.update();
    aggregator.update();
    monitor.shutdown().unwrap();

    assert_eq!(aggregator.ticks(), 2);
    assert_eq!(aggregator.last_reading(), Some(Reading::saturating(642)));
    assert_eq!(aggregator.sink().write_errors(), 0);
}

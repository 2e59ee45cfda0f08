//! Idle yielding of the sampler thread.

use super::common::{eventually, unpinned_config, SETTLE_TIMEOUT};
use level_bus::ScriptedBus;
use level_common::{BusSnapshot, DigitSlot, Reading};
use level_runtime::{start, start_with_clock, FakeClock};
use std::time::Duration;

#[test]
fn test_quiet_bus_yields_periodically() {
    let mut config = unpinned_config();
    config.sampler.idle_timeout = Duration::from_millis(20);
    config.sampler.idle_sleep = Duration::from_millis(1);

    let bus = ScriptedBus::new([
        BusSnapshot::compose(DigitSlot::Hundreds, 2),
        BusSnapshot::compose(DigitSlot::Tens, 1),
        BusSnapshot::compose(DigitSlot::Units, 5),
    ]);
    let monitor = start(&config, bus).unwrap();

    assert!(eventually(SETTLE_TIMEOUT, || monitor.counters().idle_yields >= 3));

    // Yielding never disturbs the latched digits.
    let mut aggregator = monitor.aggregator(|_r: Reading| {});
    assert_eq!(aggregator.update().value(), 215);
    assert_eq!(monitor.counters().transitions, 3);

    monitor.shutdown().unwrap();
}

#[test]
fn test_busy_bus_never_yields() {
    // 1 MHz counter advancing 1 ms per read; the 1 s window is never reached
    // because every read is a transition.
    let clock = FakeClock::new(1_000_000).with_auto_step(1_000);
    let observer = clock.clone();

    let bus = ScriptedBus::new([
        BusSnapshot::compose(DigitSlot::Hundreds, 4),
        BusSnapshot::compose(DigitSlot::Tens, 0),
        BusSnapshot::compose(DigitSlot::Units, 9),
    ])
    .repeat(true);
    let monitor = start_with_clock(&unpinned_config(), bus, clock).unwrap();

    assert!(eventually(SETTLE_TIMEOUT, || monitor.counters().iterations >= 10_000));
    monitor.shutdown().unwrap();

    assert_eq!(observer.sleep_count(), 0);
}

#[test]
fn test_quiet_bus_with_fake_clock_yields_once_per_window() {
    let clock = FakeClock::new(1_000_000).with_auto_step(1_000);
    let observer = clock.clone();

    let bus = ScriptedBus::new([BusSnapshot::compose(DigitSlot::Units, 1)]);
    let monitor = start_with_clock(&unpinned_config(), bus, clock).unwrap();

    assert!(eventually(SETTLE_TIMEOUT, || observer.sleep_count() >= 5));

    // Each quiet read moves the clock 1 ms, so a 1 s window takes more than
    // 1000 reads. Sleeps are read first; every read before them is visible.
    let slept = observer.sleep_count();
    let counters = monitor.counters();
    assert!(
        counters.iterations >= slept * 1_000,
        "{slept} yields after only {} reads",
        counters.iterations
    );
    assert_eq!(counters.transitions, 1);
    monitor.shutdown().unwrap();

    let yields = u32::try_from(observer.sleep_count()).unwrap();
    assert!(u64::from(yields) >= slept);
    assert_eq!(observer.total_slept(), Duration::from_millis(10) * yields);
}

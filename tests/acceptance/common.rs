//! Shared helpers for acceptance scenarios.

#![allow(dead_code)] // Not every scenario uses every helper

use level_common::config::{CpuAffinity, LevelConfig};
use std::thread;
use std::time::{Duration, Instant};

/// Generous bound for anything the sampler thread must observe.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default configuration without core pinning, so scenarios run on any host.
pub fn unpinned_config() -> LevelConfig {
    let mut config = LevelConfig::default();
    config.sampler.thread.cpu_affinity = CpuAffinity::None;
    config
}

/// Poll `condition` until it holds or `timeout` expires.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

//! Placement of the sampler thread.
//!
//! The sampler busy-polls, so it is pinned to its own core and optionally
//! given a real-time scheduler policy to keep best-effort work from
//! interrupting the decoding. Missing privileges degrade to warnings unless
//! `fail_fast` is set.

use level_common::config::{CpuAffinity, SchedPolicy, ThreadConfig};
use level_common::error::{LevelError, LevelResult};
#[cfg(target_os = "linux")]
use tracing::debug;
use tracing::{info, warn};

/// Placement actually applied to the calling thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementStatus {
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpu_affinity: Option<Vec<usize>>,
}

impl PlacementStatus {
    /// Whether everything requested by `config` was applied.
    pub fn satisfies(&self, config: &ThreadConfig) -> bool {
        let affinity_ok = matches!(config.cpu_affinity, CpuAffinity::None)
            || self.cpu_affinity.is_some();
        let policy_ok = config.policy == SchedPolicy::Other || self.scheduler_policy.is_some();
        affinity_ok && policy_ok
    }
}

/// Apply `config` to the calling thread.
///
/// # Errors
///
/// Returns an error if the OS rejects the request for a reason other than
/// missing privileges or absent CPUs, or if `fail_fast` is set and any part
/// of the placement could not be applied.
pub fn apply_thread_placement(config: &ThreadConfig) -> LevelResult<PlacementStatus> {
    let (scheduler_policy, scheduler_priority) = set_scheduler(config.policy, config.priority)?;
    let cpu_affinity = set_cpu_affinity(&config.cpu_affinity)?;

    let status = PlacementStatus {
        scheduler_policy,
        scheduler_priority,
        cpu_affinity,
    };

    if config.fail_fast && !status.satisfies(config) {
        let message = format!(
            "sampler thread placement not met (fail_fast=true): requested {:?}/{:?} on {:?}, applied {:?}",
            config.policy, config.priority, config.cpu_affinity, status
        );
        return Err(LevelError::Thread(message));
    }

    info!(?status, "Sampler thread placed");
    Ok(status)
}

/// Set scheduler policy and priority for the calling thread.
#[cfg(target_os = "linux")]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> LevelResult<(Option<SchedPolicy>, Option<u8>)> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => {
            debug!("Using SCHED_OTHER (non-RT) scheduling");
            return Ok((Some(SchedPolicy::Other), None));
        }
    };

    // Clamp priority to valid range (1-99 for RT policies)
    let clamped_priority = priority.clamp(1, 99);
    if clamped_priority != priority {
        warn!(
            original = priority,
            clamped = clamped_priority,
            "Scheduler priority clamped to valid range"
        );
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped_priority),
    };

    // SAFETY: pid 0 targets the calling thread and `param` is valid for the call.
    let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                "sched_setscheduler failed with EPERM - sampler runs without RT priority. \
                 Consider running with CAP_SYS_NICE capability."
            );
            return Ok((None, None));
        }
        return Err(LevelError::Thread(format!("sched_setscheduler failed: {err}")));
    }

    info!(?policy, priority = clamped_priority, "Real-time scheduler configured");
    Ok((Some(policy), Some(clamped_priority)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(
    policy: SchedPolicy,
    priority: u8,
) -> LevelResult<(Option<SchedPolicy>, Option<u8>)> {
    if policy == SchedPolicy::Other {
        return Ok((Some(SchedPolicy::Other), None));
    }
    warn!(?policy, priority, "Real-time scheduling not available on this platform");
    Ok((None, None))
}

/// Pin the calling thread.
#[cfg(target_os = "linux")]
fn set_cpu_affinity(affinity: &CpuAffinity) -> LevelResult<Option<Vec<usize>>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    let cpus = match affinity {
        CpuAffinity::None => {
            debug!("No CPU affinity configured");
            return Ok(None);
        }
        CpuAffinity::Single(cpu) => vec![*cpu],
        CpuAffinity::Set(cpus) => cpus.clone(),
    };

    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in &cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| LevelError::Config(format!("Invalid CPU index {cpu}: {e}")))?;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(?cpus, "Sampler pinned");
            Ok(Some(cpus))
        }
        Err(e) => {
            if e == nix::errno::Errno::EINVAL {
                warn!(?cpus, "Invalid CPU set - some CPUs may not exist, sampler left unpinned");
                Ok(None)
            } else {
                Err(LevelError::Thread(format!("sched_setaffinity failed: {e}")))
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(affinity: &CpuAffinity) -> LevelResult<Option<Vec<usize>>> {
    if !matches!(affinity, CpuAffinity::None) {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}

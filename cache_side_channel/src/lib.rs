#![deny(unsafe_op_in_unsafe_fn)]

use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Fixed latency cutoff, in cycles.
///
/// A time strictly below the threshold is a hit, strictly above is a miss.
/// A time equal to the threshold is neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub cycles: u64,
}

impl Threshold {
    pub const fn new(cycles: u64) -> Self {
        Threshold { cycles }
    }

    pub fn is_hit(&self, time: u64) -> bool {
        time < self.cycles
    }

    pub fn is_miss(&self, time: u64) -> bool {
        time > self.cycles
    }

    pub fn status(&self, time: u64) -> Option<CacheStatus> {
        if self.is_hit(time) {
            Some(CacheStatus::Hit)
        } else if self.is_miss(time) {
            Some(CacheStatus::Miss)
        } else {
            None
        }
    }
}

/// Pin the calling thread on `cpu`, returns the previous affinity mask.
pub fn set_affinity(cpu_set: &CpuSet) -> Result<CpuSet, nix::Error> {
    let old = sched_getaffinity(Pid::from_raw(0))?;
    sched_setaffinity(Pid::from_raw(0), cpu_set)?;
    Ok(old)
}

pub fn restore_affinity(cpu_set: &CpuSet) {
    if let Err(e) = sched_setaffinity(Pid::from_raw(0), cpu_set) {
        panic!("Failed to restore affinity: {}", e);
    }
}

pub fn single_cpu(cpu: usize) -> Result<CpuSet, nix::Error> {
    let mut core = CpuSet::new();
    core.set(cpu)?;
    Ok(core)
}

/// Lowest CPU the calling thread is currently allowed on.
pub fn first_available_cpu() -> Result<Option<usize>, nix::Error> {
    let current = sched_getaffinity(Pid::from_raw(0))?;
    for i in 0..CpuSet::count() {
        if current.is_set(i)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

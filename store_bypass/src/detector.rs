//! Cache miss ratio watch over every online CPU.
//!
//! Flush+reload style activity shows up as an unusually high share of cache
//! references that miss. Each CPU is observed for a random window, in a
//! shuffled order, with system wide hardware counters.

use crate::HarnessError;
use perf_event::events::Hardware;
use perf_event::{Builder, Counter};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;
use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MIN_WINDOW_SECS: u64 = 5;
pub const DEFAULT_MAX_WINDOW_SECS: u64 = 10;

/// Misses per hundred references, `None` when nothing was referenced.
pub fn miss_ratio(misses: u64, references: u64) -> Option<f64> {
    if references == 0 {
        None
    } else {
        Some(misses as f64 / references as f64 * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    pub cpu: usize,
    pub window: Duration,
    pub misses: u64,
    pub references: u64,
}

impl CpuSample {
    pub fn ratio(&self) -> Option<f64> {
        miss_ratio(self.misses, self.references)
    }
}

impl fmt::Display for CpuSample {
    /// `{:#}` adds the raw counts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu {}: ", self.cpu)?;
        if f.alternate() {
            write!(f, "misses: {} refs: {}, ", self.misses, self.references)?;
        }
        match self.ratio() {
            Some(ratio) => write!(f, "ratio: {:.6}%", ratio),
            None => write!(f, "ratio: undefined"),
        }
    }
}

/// CPUs the system has online, at least one.
pub fn online_cpus() -> usize {
    let cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if cpus < 1 {
        1
    } else {
        cpus as usize
    }
}

/// Every CPU of `cpus` once, shuffled, each with a window drawn from `windows` seconds.
pub fn watch_plan<R: Rng + ?Sized>(
    cpus: usize,
    windows: RangeInclusive<u64>,
    rng: &mut R,
) -> Vec<(usize, Duration)> {
    let mut order: Vec<usize> = (0..cpus).collect();
    order.shuffle(rng);
    order
        .into_iter()
        .map(|cpu| (cpu, Duration::from_secs(rng.gen_range(windows.clone()))))
        .collect()
}

fn counter(cpu: usize, kind: Hardware) -> Result<Counter, HarnessError> {
    Builder::new()
        .one_cpu(cpu)
        .observe_pid(-1)
        .kind(kind)
        .build()
        .map_err(HarnessError::Counter)
}

/// Count cache references and misses of every process on `cpu` for `window`.
pub fn watch_cpu(cpu: usize, window: Duration) -> Result<CpuSample, HarnessError> {
    let mut references = counter(cpu, Hardware::CACHE_REFERENCES)?;
    let mut misses = counter(cpu, Hardware::CACHE_MISSES)?;

    references.enable().map_err(HarnessError::Counter)?;
    misses.enable().map_err(HarnessError::Counter)?;
    thread::sleep(window);
    references.disable().map_err(HarnessError::Counter)?;
    misses.disable().map_err(HarnessError::Counter)?;

    Ok(CpuSample {
        cpu,
        window,
        misses: misses.read().map_err(HarnessError::Counter)?,
        references: references.read().map_err(HarnessError::Counter)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ratio_is_a_percentage() {
        assert_eq!(miss_ratio(25, 100), Some(25.0));
        assert_eq!(miss_ratio(0, 7), Some(0.0));
        assert_eq!(miss_ratio(3, 3), Some(100.0));
    }

    #[test]
    fn no_references_means_no_ratio() {
        assert_eq!(miss_ratio(0, 0), None);
        assert_eq!(miss_ratio(12, 0), None);
        let sample = CpuSample {
            cpu: 1,
            window: Duration::from_secs(5),
            misses: 12,
            references: 0,
        };
        assert_eq!(sample.to_string(), "cpu 1: ratio: undefined");
    }

    #[test]
    fn sample_lines() {
        let sample = CpuSample {
            cpu: 3,
            window: Duration::from_secs(7),
            misses: 1,
            references: 8,
        };
        assert_eq!(sample.to_string(), "cpu 3: ratio: 12.500000%");
        assert_eq!(
            format!("{:#}", sample),
            "cpu 3: misses: 1 refs: 8, ratio: 12.500000%"
        );
    }

    #[test]
    fn plan_visits_every_cpu_once_within_the_windows() {
        let mut rng = StdRng::seed_from_u64(0xcafe);
        let plan = watch_plan(16, 5..=10, &mut rng);
        let mut cpus: Vec<usize> = plan.iter().map(|&(cpu, _)| cpu).collect();
        cpus.sort_unstable();
        assert_eq!(cpus, (0..16).collect::<Vec<_>>());
        for (_, window) in &plan {
            assert!((5..=10).contains(&window.as_secs()));
        }
    }

    #[test]
    fn single_second_windows() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = watch_plan(2, 1..=1, &mut rng);
        assert!(plan.iter().all(|&(_, w)| w == Duration::from_secs(1)));
        assert!(online_cpus() >= 1);
    }

    #[test]
    #[ignore = "needs perf_event_paranoid <= 0 or CAP_PERFMON"]
    fn counters_move_on_a_busy_cpu() {
        let sample = watch_cpu(0, Duration::from_millis(200)).unwrap();
        assert!(sample.references > 0);
        assert!(sample.ratio().is_some());
    }
}

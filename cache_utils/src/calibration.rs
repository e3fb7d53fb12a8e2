use crate::histograms::{SimpleBucketU64, StaticHistogram};
use crate::{flush, maccess, mfence, serialize};
use core::arch::asm;

pub const BUCKET_SIZE: u64 = 5;
pub const BUCKET_NUMBER: usize = 250;
pub const CALIBRATION_ITERATIONS: usize = 1 << 10;

/// Miss buckets holding this many samples or fewer are treated as noise.
const MISS_NOISE: u32 = 3;

pub type LatencyHistogram = StaticHistogram<BUCKET_SIZE, BUCKET_NUMBER>;
type Bucket = SimpleBucketU64<BUCKET_SIZE, BUCKET_NUMBER>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    NoOutput,
    Thresholds,
    RawResult,
}

/// Time one load from `p`: `lfence; rdtscp`, load, `rdtscp; lfence`.
///
/// Only the low halves of the counter are compared, the difference wraps.
///
/// # Safety
///
/// p must be valid for an 8 byte read.
#[inline(always)]
pub unsafe fn only_reload(p: *const u8) -> u64 {
    let start: u32;
    let end: u32;
    unsafe {
        asm!(
            "lfence",
            "rdtscp",
            "mov {start:e}, eax",
            "mov {sink}, qword ptr [{p}]",
            "rdtscp",
            "lfence",
            p = in(reg) p,
            start = out(reg) start,
            sink = out(reg) _,
            out("eax") end,
            out("ecx") _,
            out("edx") _,
            options(nostack),
        )
    };
    end.wrapping_sub(start) as u64
}

/// # Safety
///
/// p must be valid for an 8 byte read.
pub unsafe fn flush_and_reload(p: *const u8) -> u64 {
    unsafe { flush(p) };
    mfence();
    unsafe { only_reload(p) }
}

#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub hit: LatencyHistogram,
    pub miss: LatencyHistogram,
    pub threshold: Option<u64>,
}

/// Pick a hit threshold from a hit and a miss latency distribution.
///
/// Searches the least populated bucket between the hit mode and the first
/// significant miss bucket. `None` when the two distributions overlap.
pub fn threshold_from_histograms(hit: &LatencyHistogram, miss: &LatencyHistogram) -> Option<u64> {
    let hit_max = hit.mode()?;
    let (miss_min, _) = miss.iter().find(|&(_, count)| count > MISS_NOISE)?;
    if miss_min <= hit_max {
        return None;
    }
    let mut best: Option<(Bucket, u32)> = None;
    for (bucket, hit_count) in hit.iter() {
        if bucket < hit_max || bucket >= miss_min {
            continue;
        }
        let total = hit_count + miss[&bucket];
        match best {
            Some((_, t)) if t <= total => {}
            _ => best = Some((bucket, total)),
        }
    }
    best.map(|(bucket, _)| bucket.time())
}

/// Measure hit and miss latencies of every `stride`-th line of `array`.
pub fn calibrate_access(array: &[u8], stride: usize, verbosity: Verbosity) -> CalibrationResult {
    let mut hit = LatencyHistogram::empty();
    let mut miss = LatencyHistogram::empty();

    let pointer = array.as_ptr();
    if pointer as usize & 0x3f != 0 {
        panic!("not aligned nicely");
    }

    log::info!(
        "Calibrating on {} lines from {:p}...",
        array.len().div_ceil(stride),
        pointer
    );

    // the last 8 bytes of the array are the last line a qword read may start at
    let last = array.len().saturating_sub(8);
    for offset in (0..=last).step_by(stride) {
        let p = unsafe { pointer.add(offset) };
        unsafe { maccess(p) };
        for _ in 0..CALIBRATION_ITERATIONS {
            serialize();
            hit.record(unsafe { only_reload(p) });
        }
        for _ in 0..CALIBRATION_ITERATIONS {
            serialize();
            miss.record(unsafe { flush_and_reload(p) });
        }
    }

    if verbosity >= Verbosity::RawResult {
        for ((bucket, h), (_, m)) in hit.iter().zip(miss.iter()) {
            if h != 0 || m != 0 {
                log::info!("{:4}: {:10} {:10}", bucket.time(), h, m);
            }
        }
    }

    let threshold = threshold_from_histograms(&hit, &miss);
    if verbosity >= Verbosity::Thresholds {
        if let Some(mode) = hit.mode() {
            log::info!("Max hit {}", mode.time());
        }
        match threshold {
            Some(t) => log::info!("Threshold {}", t),
            None => log::warn!("Hit and miss distributions overlap, no threshold"),
        }
    }

    CalibrationResult {
        hit,
        miss,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(samples: &[(u64, u32)]) -> LatencyHistogram {
        let mut h = LatencyHistogram::empty();
        for &(time, count) in samples {
            for _ in 0..count {
                h.record(time);
            }
        }
        h
    }

    #[test]
    fn threshold_in_valley() {
        let hit = histogram(&[(40, 900), (45, 80), (60, 2), (150, 1)]);
        let miss = histogram(&[(45, 1), (70, 2), (200, 500), (220, 300)]);
        // between the hit mode (40) and the first significant miss bucket (200),
        // 50 is the first empty bucket.
        assert_eq!(threshold_from_histograms(&hit, &miss), Some(50));
    }

    #[test]
    fn overlapping_distributions_have_no_threshold() {
        let hit = histogram(&[(200, 100)]);
        let miss = histogram(&[(100, 100)]);
        assert_eq!(threshold_from_histograms(&hit, &miss), None);
    }

    #[test]
    fn empty_histograms_have_no_threshold() {
        let empty = LatencyHistogram::empty();
        let miss = histogram(&[(300, 10)]);
        assert_eq!(threshold_from_histograms(&empty, &miss), None);
        assert_eq!(threshold_from_histograms(&miss, &empty), None);
    }

    #[test]
    #[ignore = "needs a quiet x86_64 machine, timing dependent"]
    fn calibration_separates_hits_from_misses() {
        let array = vec![1u8; 64 * 4096];
        let aligned = &array[array.as_ptr().align_offset(64)..][..32 * 4096];
        let result = calibrate_access(aligned, 4096, Verbosity::NoOutput);
        let threshold = result.threshold.expect("no threshold");
        assert!(result.hit.mode().unwrap().time() < threshold);
    }
}

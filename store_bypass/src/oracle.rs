//! Flush+reload probe of the two candidate oracle lines.

use crate::layout::CovertLayout;
use cache_side_channel::CacheStatus::{Hit, Miss};
use cache_side_channel::Threshold;
use cache_utils::calibration::only_reload;
use cache_utils::serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Zero,
    One,
    Inconclusive,
}

impl TrialOutcome {
    pub fn bit(self) -> Option<u8> {
        match self {
            TrialOutcome::Zero => Some(0),
            TrialOutcome::One => Some(1),
            TrialOutcome::Inconclusive => None,
        }
    }
}

/// Latency of one load from `line`, serialised on both sides.
///
/// # Safety
///
/// line must be valid for an 8 byte read.
#[inline(always)]
pub unsafe fn probe(line: *const u8) -> u64 {
    serialize();
    let time = unsafe { only_reload(line) };
    serialize();
    time
}

/// Reload latencies of the bit 0 line, then the bit 1 line.
pub fn measure(layout: &CovertLayout) -> [u64; 2] {
    let [zero, one] = layout.candidate_lines();
    let d0 = unsafe { probe(zero) };
    let d1 = unsafe { probe(one) };
    [d0, d1]
}

/// Exactly one hit decides the bit, anything else is inconclusive.
pub fn classify(threshold: &Threshold, [d0, d1]: [u64; 2]) -> TrialOutcome {
    match (threshold.status(d0), threshold.status(d1)) {
        (Some(Hit), Some(Miss)) => TrialOutcome::Zero,
        (Some(Miss), Some(Hit)) => TrialOutcome::One,
        _ => TrialOutcome::Inconclusive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Threshold = Threshold::new(120);

    #[test]
    fn one_fast_line_decides() {
        assert_eq!(classify(&T, [40, 300]), TrialOutcome::Zero);
        assert_eq!(classify(&T, [300, 40]), TrialOutcome::One);
        assert_eq!(classify(&T, [119, 121]), TrialOutcome::Zero);
        assert_eq!(classify(&T, [121, 119]), TrialOutcome::One);
    }

    #[test]
    fn same_speed_is_inconclusive() {
        assert_eq!(classify(&T, [40, 45]), TrialOutcome::Inconclusive);
        assert_eq!(classify(&T, [300, 280]), TrialOutcome::Inconclusive);
    }

    #[test]
    fn threshold_itself_is_neither() {
        assert_eq!(classify(&T, [120, 300]), TrialOutcome::Inconclusive);
        assert_eq!(classify(&T, [40, 120]), TrialOutcome::Inconclusive);
        assert_eq!(classify(&T, [120, 120]), TrialOutcome::Inconclusive);
    }

    #[test]
    fn outcome_follows_line_status() {
        for d0 in 115..=125 {
            for d1 in 115..=125 {
                let expected = match (T.status(d0), T.status(d1)) {
                    (Some(Hit), Some(Miss)) => Some(0),
                    (Some(Miss), Some(Hit)) => Some(1),
                    _ => None,
                };
                assert_eq!(classify(&T, [d0, d1]).bit(), expected, "{} {}", d0, d1);
            }
        }
    }

    #[test]
    fn outcome_bits() {
        assert_eq!(TrialOutcome::Zero.bit(), Some(0));
        assert_eq!(TrialOutcome::One.bit(), Some(1));
        assert_eq!(TrialOutcome::Inconclusive.bit(), None);
    }

    #[test]
    #[ignore = "needs a quiet x86_64 machine, timing dependent"]
    fn evicted_lines_are_slower_than_cached_ones() {
        use crate::conditioner::prepare_trial;
        let layout = CovertLayout::new(b"0").unwrap();
        let mut cold = 0;
        let mut warm = 0;
        for _ in 0..1000 {
            prepare_trial(&layout);
            let [c, _] = measure(&layout);
            let [w, _] = measure(&layout);
            cold += c;
            warm += w;
        }
        assert!(warm < cold);
    }
}

//! Aggregation of many noisy trials into one decision per secret byte.

use crate::oracle::TrialOutcome;
use std::cmp::Ordering;

/// Anything that can run one trial on a secret position.
pub trait TrialSource {
    fn trial(&mut self, index: usize) -> TrialOutcome;
}

impl<F: FnMut(usize) -> TrialOutcome> TrialSource for F {
    fn trial(&mut self, index: usize) -> TrialOutcome {
        self(index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteAggregate {
    /// Decisive bits, in trial order.
    pub results: Vec<u8>,
    pub trials: usize,
    pub inconclusive: usize,
}

impl ByteAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: TrialOutcome) {
        self.trials += 1;
        match outcome.bit() {
            Some(bit) => self.results.push(bit),
            None => self.inconclusive += 1,
        }
    }

    pub fn decisive(&self) -> usize {
        self.results.len()
    }

    /// Decisive trials over all trials, 0 when nothing ran.
    pub fn hit_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.decisive() as f64 / self.trials as f64
        }
    }

    /// Majority of the decisive bits, `None` on a tie.
    pub fn inferred_bit(&self) -> Option<u8> {
        let ones = self.results.iter().filter(|&&b| b == 1).count();
        let zeros = self.decisive() - ones;
        match ones.cmp(&zeros) {
            Ordering::Greater => Some(1),
            Ordering::Less => Some(0),
            Ordering::Equal => None,
        }
    }

    pub fn inferred_symbol(&self) -> char {
        match self.inferred_bit() {
            Some(0) => '0',
            Some(_) => '1',
            None => '?',
        }
    }
}

/// Run `trials` trials on position `index`.
pub fn collect_byte<S: TrialSource + ?Sized>(
    source: &mut S,
    index: usize,
    trials: usize,
) -> ByteAggregate {
    let mut aggregate = ByteAggregate::new();
    for _ in 0..trials {
        aggregate.record(source.trial(index));
    }
    aggregate
}

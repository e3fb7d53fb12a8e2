//! Text output of a run.

use crate::classifier::ByteAggregate;
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ByteReport {
    pub round: usize,
    pub index: usize,
    /// Known secret byte, used for validation only.
    pub secret: u8,
    pub aggregate: ByteAggregate,
}

impl ByteReport {
    pub fn matches_secret(&self) -> bool {
        self.aggregate.inferred_symbol() == self.secret as char
    }
}

impl fmt::Display for ByteReport {
    /// `secret -> inferred: decisive bits in N trials (hitrate: P%)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {} in {} trials (hitrate: {:.6}%)",
            self.secret as char,
            self.aggregate.inferred_symbol(),
            self.aggregate.results.iter().join(""),
            self.aggregate.trials,
            self.aggregate.hit_rate() * 100.0
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub positions: usize,
    pub trials: usize,
    pub decisive: usize,
    pub matching: usize,
}

impl RunSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a ByteReport>) -> Self {
        reports
            .into_iter()
            .fold(RunSummary::default(), |mut summary, report| {
                summary.positions += 1;
                summary.trials += report.aggregate.trials;
                summary.decisive += report.aggregate.decisive();
                summary.matching += report.matches_secret() as usize;
                summary
            })
    }

    pub fn hit_rate(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.decisive as f64 / self.trials as f64
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} positions, {} of {} trials decisive (hitrate: {:.6}%), {} of {} positions recovered",
            self.positions,
            self.decisive,
            self.trials,
            self.hit_rate() * 100.0,
            self.matching,
            self.positions
        )
    }
}

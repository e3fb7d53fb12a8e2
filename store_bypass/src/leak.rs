//! The measurement loop on real hardware.

use crate::classifier::{collect_byte, TrialSource};
use crate::conditioner::prepare_trial;
use crate::config::HarnessConfig;
use crate::gadget::{self, GadgetVariant};
use crate::layout::CovertLayout;
use crate::oracle::{classify, measure, TrialOutcome};
use crate::privilege::MeasurementPrivileges;
use crate::report::ByteReport;
use crate::HarnessError;
use cache_side_channel::{
    first_available_cpu, restore_affinity, set_affinity, single_cpu, Threshold,
};
use nix::sched::CpuSet;

/// Conditioner, gadget and oracle, one full cycle per trial.
pub struct HardwareTrials<'a> {
    pub layout: &'a CovertLayout,
    pub threshold: Threshold,
    pub variant: GadgetVariant,
}

impl TrialSource for HardwareTrials<'_> {
    fn trial(&mut self, index: usize) -> TrialOutcome {
        prepare_trial(self.layout);
        gadget::run(self.layout, index, self.variant);
        classify(&self.threshold, measure(self.layout))
    }
}

/// Leak every position of the secret, `config.rounds` times over.
///
/// With `privileges`, interrupts are masked while the trials of one position
/// run and unmasked between positions.
pub fn leak_secret(
    config: &HarnessConfig,
    layout: &CovertLayout,
    privileges: Option<&MeasurementPrivileges>,
) -> Vec<ByteReport> {
    let mut source = HardwareTrials {
        layout,
        threshold: config.threshold,
        variant: config.variant,
    };
    let mut reports = Vec::with_capacity(config.rounds * layout.secret_len());
    for round in 0..config.rounds {
        log::debug!("Round {}", round);
        for index in 0..layout.secret_len() {
            let aggregate = {
                let _masked = privileges.map(|p| p.disable_interrupts());
                collect_byte(&mut source, index, config.trials)
            };
            reports.push(ByteReport {
                round,
                index,
                secret: layout.secret_byte(index),
                aggregate,
            });
        }
    }
    reports
}

/// Affinity of the calling thread narrowed to one CPU until dropped.
pub struct PinnedCpu {
    pub cpu: usize,
    old: CpuSet,
}

impl PinnedCpu {
    /// Pin on `cpu`, or on the first CPU the thread may run on.
    pub fn new(cpu: Option<usize>) -> Result<Self, HarnessError> {
        let cpu = match cpu {
            Some(cpu) => cpu,
            None => first_available_cpu()
                .map_err(HarnessError::Affinity)?
                .ok_or_else(|| HarnessError::InvalidConfig("no cpu available".into()))?,
        };
        let old = single_cpu(cpu)
            .and_then(|set| set_affinity(&set))
            .map_err(HarnessError::Affinity)?;
        log::info!("Pinned to cpu {}", cpu);
        Ok(PinnedCpu { cpu, old })
    }
}

impl Drop for PinnedCpu {
    fn drop(&mut self) {
        restore_affinity(&self.old);
    }
}

//! Command line and validated run configuration.

use crate::detector::{DEFAULT_MAX_WINDOW_SECS, DEFAULT_MIN_WINDOW_SECS};
use crate::gadget::GadgetVariant;
use crate::layout::CovertLayout;
use crate::HarnessError;
use cache_side_channel::Threshold;
use cache_utils::calibration::Verbosity;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::ops::RangeInclusive;

/// Hit threshold in cycles when neither the command line nor the build sets one.
pub const DEFAULT_HIT_THRESHOLD: u64 = 120;
pub const DEFAULT_TRIALS: usize = 1000;
pub const DEFAULT_SECRET: &str = "11110000101001010011110011100111";

/// `STORE_BYPASS_HIT_THRESHOLD` at build time, else [`DEFAULT_HIT_THRESHOLD`].
pub fn default_hit_threshold() -> u64 {
    hit_threshold_from(option_env!("STORE_BYPASS_HIT_THRESHOLD"))
}

fn hit_threshold_from(value: Option<&str>) -> u64 {
    match value.map(|s| s.trim().parse::<u64>()) {
        Some(Ok(threshold)) => threshold,
        Some(Err(e)) => {
            log::warn!(
                "STORE_BYPASS_HIT_THRESHOLD={:?} is not a cycle count ({}), using {}",
                value.unwrap_or_default(),
                e,
                DEFAULT_HIT_THRESHOLD
            );
            DEFAULT_HIT_THRESHOLD
        }
        None => DEFAULT_HIT_THRESHOLD,
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Leak a bit string through speculative store bypass")]
pub struct Cli {
    /// Defaults to `leak` with default arguments.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Leak the secret bit by bit and report per position.
    Leak(LeakArgs),
    /// Measure hit and miss latencies on the oracle and suggest a threshold.
    Calibrate(CalibrateArgs),
    /// Watch the cache miss ratio of every CPU, in random order and windows.
    Detect(DetectArgs),
}

#[derive(Debug, Clone, Args)]
pub struct LeakArgs {
    /// Reload latency below which an oracle line counts as cached, in cycles.
    #[arg(long, default_value_t = default_hit_threshold())]
    pub threshold: u64,
    /// Trials per secret position.
    #[arg(long, default_value_t = DEFAULT_TRIALS)]
    pub trials: usize,
    /// Passes over the whole secret.
    #[arg(long, default_value_t = 1)]
    pub rounds: usize,
    /// Bit string to leak, one '0' or '1' per position.
    #[arg(long, default_value = DEFAULT_SECRET)]
    pub secret: String,
    /// Mask interrupts around each position (needs iopl and mlockall).
    #[arg(long)]
    pub no_interrupts: bool,
    /// Put `cpuid; lfence` between the store and the load, which should kill the leak.
    #[arg(long)]
    pub serialize_critical_path: bool,
    /// CPU to pin to, defaults to the first allowed one.
    #[arg(long)]
    pub cpu: Option<usize>,
}

impl Default for LeakArgs {
    fn default() -> Self {
        LeakArgs {
            threshold: default_hit_threshold(),
            trials: DEFAULT_TRIALS,
            rounds: 1,
            secret: DEFAULT_SECRET.to_owned(),
            no_interrupts: false,
            serialize_critical_path: false,
            cpu: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CalibrationVerbosity {
    Quiet,
    Thresholds,
    Raw,
}

impl From<CalibrationVerbosity> for Verbosity {
    fn from(v: CalibrationVerbosity) -> Self {
        match v {
            CalibrationVerbosity::Quiet => Verbosity::NoOutput,
            CalibrationVerbosity::Thresholds => Verbosity::Thresholds,
            CalibrationVerbosity::Raw => Verbosity::RawResult,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CalibrateArgs {
    #[arg(long)]
    pub cpu: Option<usize>,
    #[arg(long, value_enum, default_value_t = CalibrationVerbosity::Thresholds)]
    pub verbosity: CalibrationVerbosity,
}

#[derive(Debug, Clone, Args)]
pub struct DetectArgs {
    /// Print the raw miss and reference counts.
    #[arg(short, long)]
    pub verbose: bool,
    /// Shortest observation window per CPU, in seconds.
    #[arg(long, default_value_t = DEFAULT_MIN_WINDOW_SECS)]
    pub min_window: u64,
    /// Longest observation window per CPU, in seconds.
    #[arg(long, default_value_t = DEFAULT_MAX_WINDOW_SECS)]
    pub max_window: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectConfig {
    pub verbose: bool,
    /// Window bounds in seconds.
    pub windows: RangeInclusive<u64>,
}

impl TryFrom<DetectArgs> for DetectConfig {
    type Error = HarnessError;

    fn try_from(args: DetectArgs) -> Result<Self, Self::Error> {
        if args.min_window == 0 || args.min_window > args.max_window {
            return Err(HarnessError::InvalidConfig(format!(
                "window bounds must satisfy 1 <= min <= max, got {}..={}",
                args.min_window, args.max_window
            )));
        }
        Ok(DetectConfig {
            verbose: args.verbose,
            windows: args.min_window..=args.max_window,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub secret: Vec<u8>,
    pub threshold: Threshold,
    pub trials: usize,
    pub rounds: usize,
    pub mask_interrupts: bool,
    pub variant: GadgetVariant,
    pub cpu: Option<usize>,
}

impl TryFrom<LeakArgs> for HarnessConfig {
    type Error = HarnessError;

    /// Positions that are not '0' or '1' are kept, they have no candidate
    /// region and end up reported as '?'.
    fn try_from(args: LeakArgs) -> Result<Self, Self::Error> {
        if args.secret.is_empty() || args.secret.len() > CovertLayout::MAX_SECRET_LEN {
            return Err(HarnessError::InvalidConfig(format!(
                "secret must be 1 to {} bytes long",
                CovertLayout::MAX_SECRET_LEN
            )));
        }
        if !args.secret.is_ascii() {
            return Err(HarnessError::InvalidConfig(
                "secret must be ASCII, one byte per position".into(),
            ));
        }
        if args.trials == 0 {
            return Err(HarnessError::InvalidConfig("trials must be positive".into()));
        }
        if args.rounds == 0 {
            return Err(HarnessError::InvalidConfig("rounds must be positive".into()));
        }
        if args.threshold == 0 {
            return Err(HarnessError::InvalidConfig("threshold must be positive".into()));
        }
        let variant = if args.serialize_critical_path {
            GadgetVariant::Serialized
        } else {
            GadgetVariant::Bypass
        };
        Ok(HarnessConfig {
            secret: args.secret.into_bytes(),
            threshold: Threshold::new(args.threshold),
            trials: args.trials,
            rounds: args.rounds,
            mask_interrupts: args.no_interrupts,
            variant,
            cpu: args.cpu,
        })
    }
}

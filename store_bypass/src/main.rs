#![deny(unsafe_op_in_unsafe_fn)]

use anyhow::{Context, Result};
use cache_utils::calibration::calibrate_access;
use clap::Parser;
use store_bypass::config::{
    CalibrateArgs, Cli, Command, DetectArgs, DetectConfig, HarnessConfig, LeakArgs,
};
use store_bypass::detector::{online_cpus, watch_cpu, watch_plan};
use store_bypass::layout::{CovertLayout, ORACLE_STRIDE};
use store_bypass::leak::{leak_secret, PinnedCpu};
use store_bypass::privilege::MeasurementPrivileges;
use store_bypass::report::RunSummary;

fn leak(args: LeakArgs) -> Result<()> {
    let config = HarnessConfig::try_from(args)?;
    // privileges first so that mlockall covers the layout as well
    let privileges = if config.mask_interrupts {
        Some(MeasurementPrivileges::acquire().context("masking interrupts needs mlockall and iopl(3)")?)
    } else {
        None
    };
    let layout = CovertLayout::new(&config.secret)?;
    let pinned = PinnedCpu::new(config.cpu)?;

    log::info!(
        "Leaking {} positions, {} trials each, {} round(s), threshold {} cycles, {:?} gadget{}",
        layout.secret_len(),
        config.trials,
        config.rounds,
        config.threshold.cycles,
        config.variant,
        if privileges.is_some() { ", interrupts masked" } else { "" }
    );

    let reports = leak_secret(&config, &layout, privileges.as_ref());
    drop(pinned);

    for report in &reports {
        println!("{}", report);
    }
    println!("{}", RunSummary::from_reports(&reports));
    Ok(())
}

fn calibrate(args: CalibrateArgs) -> Result<()> {
    // the secret does not matter, only the oracle is used
    let layout = CovertLayout::new(b"0")?;
    let _pinned = PinnedCpu::new(args.cpu)?;
    let result = calibrate_access(layout.oracle_regions(), ORACLE_STRIDE, args.verbosity.into());
    match result.threshold {
        Some(threshold) => {
            println!("{}", threshold);
            Ok(())
        }
        None => anyhow::bail!("hit and miss latencies overlap, no threshold found"),
    }
}

fn detect(args: DetectArgs) -> Result<()> {
    let config = DetectConfig::try_from(args)?;
    let plan = watch_plan(online_cpus(), config.windows, &mut rand::thread_rng());
    for (cpu, window) in plan {
        println!("checking cpu {} for {} seconds", cpu, window.as_secs());
        let sample = watch_cpu(cpu, window)
            .with_context(|| format!("cannot count cache events on cpu {}", cpu))?;
        if config.verbose {
            println!("{:#}", sample);
        } else {
            println!("{}", sample);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command.unwrap_or_else(|| Command::Leak(LeakArgs::default())) {
        Command::Leak(args) => leak(args),
        Command::Calibrate(args) => calibrate(args),
        Command::Detect(args) => detect(args),
    }
}

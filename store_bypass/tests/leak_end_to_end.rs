use store_bypass::config::{HarnessConfig, LeakArgs};
use store_bypass::layout::CovertLayout;
use store_bypass::leak::{leak_secret, PinnedCpu};
use store_bypass::report::RunSummary;

fn run(serialize_critical_path: bool) -> RunSummary {
    let config = HarnessConfig::try_from(LeakArgs {
        serialize_critical_path,
        ..LeakArgs::default()
    })
    .unwrap();
    let layout = CovertLayout::new(&config.secret).unwrap();
    let _pinned = PinnedCpu::new(config.cpu).unwrap();
    RunSummary::from_reports(&leak_secret(&config, &layout, None))
}

// Reference scenario: 32 positions, 1000 trials each, default threshold.
#[test]
#[ignore = "needs a vulnerable x86_64 machine and a calibrated threshold"]
fn default_secret_is_recovered() {
    let summary = run(false);
    assert_eq!(summary.positions, 32);
    assert!(summary.hit_rate() > 0.5, "{}", summary);
    assert_eq!(summary.matching, summary.positions, "{}", summary);
}

#[test]
#[ignore = "needs a vulnerable x86_64 machine and a calibrated threshold"]
fn serialized_gadget_does_worse() {
    let leaky = run(false);
    let serialized = run(true);
    assert!(serialized.hit_rate() < leaky.hit_rate(), "{} vs {}", serialized, leaky);
}

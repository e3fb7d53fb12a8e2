#![deny(unsafe_op_in_unsafe_fn)]

//! Speculative store bypass leak harness.
//!
//! A store whose address hangs on a cache-cold pointer is speculatively
//! skipped by a later load of the same slot. The load sees the stale secret
//! pointer, and the secret byte picks which oracle page gets cached before the
//! processor notices and replays. Flush+reload on the two candidate pages
//! turns that into one bit per trial.
//!
//! Data flow of one trial:
//! [`conditioner::prepare_trial`] → [`gadget::run`] → [`oracle::measure`] →
//! [`oracle::classify`], driven by [`classifier::collect_byte`].

use static_assertions::assert_cfg;

assert_cfg!(target_arch = "x86_64", "store_bypass only supports x86_64");

pub mod classifier;
pub mod conditioner;
pub mod config;
pub mod detector;
pub mod gadget;
pub mod layout;
pub mod leak;
pub mod oracle;
pub mod privilege;
pub mod report;

use cache_utils::mmap::MMapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to allocate the covert channel memory: {0}")]
    Layout(#[source] MMapError),
    #[error("failed to lock memory: {0}")]
    MemoryLock(#[source] MMapError),
    #[error("iopl(3) failed: {0}")]
    IoPrivilege(#[source] std::io::Error),
    #[error("failed to set cpu affinity: {0}")]
    Affinity(#[source] nix::Error),
    #[error("hardware counter unavailable: {0}")]
    Counter(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

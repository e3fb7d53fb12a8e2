//! Reset of the cache and pipeline state before each trial.

use crate::layout::CovertLayout;
use cache_utils::{flush, mfence, serialize};
use core::ptr::write_volatile;

/// Arm the cells and evict the lines the gadget and the oracle depend on.
///
/// After this, the indirection cell points at the dependency cell, the
/// dependency cell points at the secret, and the indirection cell and both
/// candidate oracle lines are out of the cache.
pub fn prepare_trial(layout: &CovertLayout) {
    let indirection = layout.indirection_cell();
    let dependency = layout.dependency_cell();
    let lines = layout.candidate_lines();

    serialize();
    unsafe {
        write_volatile(indirection, dependency);
        write_volatile(dependency, layout.secret());
        for line in lines {
            // touch, so the clflush below has something to evict
            write_volatile(line, 1);
        }
    }
    serialize();

    unsafe {
        flush(indirection.cast::<u8>());
        for line in lines {
            flush(line);
        }
    }
    mfence();
    serialize();
}

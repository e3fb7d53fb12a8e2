#![deny(unsafe_op_in_unsafe_fn)]

use static_assertions::assert_cfg;

assert_cfg!(target_arch = "x86_64", "cache_utils only supports x86_64");

pub mod calibration;
pub mod histograms;
pub mod mmap;

use core::arch::asm;
use core::ptr;

pub const CACHE_LINE_LEN: usize = 64;
pub const PAGE_LEN: usize = 1 << 12;

/// Full pipeline serialisation: `cpuid` (leaf 0) followed by `lfence`.
///
/// Acts as a compiler barrier as well, no memory access is moved across it.
#[inline(always)]
pub fn serialize() {
    // rbx is reserved by LLVM, save it by hand around cpuid.
    unsafe {
        asm!(
            "mov {rbx_save}, rbx",
            "xor eax, eax",
            "cpuid",
            "mov rbx, {rbx_save}",
            "lfence",
            rbx_save = out(reg) _,
            out("eax") _,
            out("ecx") _,
            out("edx") _,
            options(nostack),
        )
    };
}

#[inline(always)]
pub fn mfence() {
    unsafe { asm!("mfence", options(nostack, preserves_flags)) };
}

/// # Safety
///
/// p must be valid for reads.
#[inline(always)]
pub unsafe fn maccess<T>(p: *const T) {
    unsafe { ptr::read_volatile(p) };
}

// flush (clflush)
/// # Safety
///
/// p must point into mapped memory.
#[inline(always)]
pub unsafe fn flush(p: *const u8) {
    unsafe { asm!("clflush [{0}]", in(reg) p, options(nostack, preserves_flags)) };
}

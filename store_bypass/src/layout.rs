//! Placement of the covert channel memory.
//!
//! Three separate mappings:
//! - cells: one page each for the indirection cell, the dependency cell and
//!   the sink byte, each cell in the middle of its page.
//! - sources: the secret on one page, the decoy on the next.
//! - oracle: 256 regions of 4 KiB, one per byte value, behind a guard offset.

use crate::HarnessError;
use cache_utils::mmap::MMappedMemory;
use cache_utils::{CACHE_LINE_LEN, PAGE_LEN};
use static_assertions::const_assert;

pub const ORACLE_STRIDE: usize = PAGE_LEN;
pub const ORACLE_REGIONS: usize = 256;
pub const ORACLE_OFFSET: usize = 0x10000;
pub const ORACLE_LEN: usize = 0x20_0000;

/// Log2 of [`ORACLE_STRIDE`], the gadget shifts the leaked byte by this.
pub const ORACLE_SHIFT: u32 = 12;

/// Byte value encoding bit 0 and bit 1 in the secret.
pub const BIT_SYMBOLS: [u8; 2] = [b'0', b'1'];
pub const DECOY_BYTE: u8 = b'#';

const CELL_OFFSET: usize = PAGE_LEN / 2;
const INDIRECTION_PAGE: usize = 0;
const DEPENDENCY_PAGE: usize = 1;
const SINK_PAGE: usize = 2;
const CELL_PAGES: usize = 3;

const_assert!(1 << ORACLE_SHIFT == ORACLE_STRIDE);
const_assert!(ORACLE_STRIDE >= PAGE_LEN);
const_assert!(ORACLE_OFFSET + ORACLE_REGIONS * ORACLE_STRIDE <= ORACLE_LEN);
const_assert!(CELL_OFFSET % CACHE_LINE_LEN == 0);
const_assert!(DECOY_BYTE != BIT_SYMBOLS[0] && DECOY_BYTE != BIT_SYMBOLS[1]);

#[derive(Debug)]
pub struct CovertLayout {
    cells: MMappedMemory,
    sources: MMappedMemory,
    oracle: MMappedMemory,
    secret_len: usize,
}

impl CovertLayout {
    pub const MAX_SECRET_LEN: usize = PAGE_LEN;

    pub fn new(secret: &[u8]) -> Result<Self, HarnessError> {
        if secret.is_empty() || secret.len() > Self::MAX_SECRET_LEN {
            return Err(HarnessError::InvalidConfig(format!(
                "secret length must be in 1..={}, got {}",
                Self::MAX_SECRET_LEN,
                secret.len()
            )));
        }
        let cells = MMappedMemory::new(CELL_PAGES * PAGE_LEN, |_| 0)
            .map_err(HarnessError::Layout)?;
        let sources = MMappedMemory::new(2 * PAGE_LEN, |i| {
            if i < secret.len() {
                secret[i]
            } else if (PAGE_LEN..PAGE_LEN + secret.len()).contains(&i) {
                DECOY_BYTE
            } else {
                0
            }
        })
        .map_err(HarnessError::Layout)?;
        let oracle =
            MMappedMemory::new(ORACLE_LEN, |_| 0).map_err(HarnessError::Layout)?;
        let layout = CovertLayout {
            cells,
            sources,
            oracle,
            secret_len: secret.len(),
        };
        log::debug!(
            "indirection cell {:p}, dependency cell {:p}, secret {:p}, decoy {:p}, oracle {:p}",
            layout.indirection_cell(),
            layout.dependency_cell(),
            layout.secret(),
            layout.decoy(),
            layout.oracle_base()
        );
        Ok(layout)
    }

    fn cell(&self, page: usize) -> *mut u8 {
        unsafe { self.cells.as_mut_ptr().add(page * PAGE_LEN + CELL_OFFSET) }
    }

    /// Holds the address of the dependency cell ("flushy").
    pub fn indirection_cell(&self) -> *mut *mut *const u8 {
        self.cell(INDIRECTION_PAGE).cast()
    }

    /// Holds the address of the secret or of the decoy ("memory slot").
    pub fn dependency_cell(&self) -> *mut *const u8 {
        self.cell(DEPENDENCY_PAGE).cast()
    }

    /// Architectural destination of the oracle load.
    pub fn sink(&self) -> *mut u8 {
        self.cell(SINK_PAGE)
    }

    pub fn secret(&self) -> *const u8 {
        self.sources.as_ptr()
    }

    pub fn decoy(&self) -> *const u8 {
        unsafe { self.sources.as_ptr().add(PAGE_LEN) }
    }

    pub fn secret_len(&self) -> usize {
        self.secret_len
    }

    /// Ground truth for the report, never read on the measurement path.
    pub fn secret_byte(&self, index: usize) -> u8 {
        self.sources[..self.secret_len][index]
    }

    pub fn oracle_base(&self) -> *mut u8 {
        unsafe { self.oracle.as_mut_ptr().add(ORACLE_OFFSET) }
    }

    /// First line of the oracle region for `value`.
    pub fn oracle_line(&self, value: u8) -> *mut u8 {
        unsafe { self.oracle_base().add((value as usize) << ORACLE_SHIFT) }
    }

    /// Oracle lines for bit 0 and bit 1.
    pub fn candidate_lines(&self) -> [*mut u8; 2] {
        BIT_SYMBOLS.map(|symbol| self.oracle_line(symbol))
    }

    /// The 256 oracle regions, for calibration.
    pub fn oracle_regions(&self) -> &[u8] {
        &self.oracle[ORACLE_OFFSET..ORACLE_OFFSET + ORACLE_REGIONS * ORACLE_STRIDE]
    }
}

use core::ffi::c_void;
use core::num::NonZeroUsize;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::slice::{from_raw_parts, from_raw_parts_mut};
use nix::sys::mman;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MMapError {
    #[error("cannot map an empty region")]
    Empty,
    #[error("mmap failed: {0}")]
    Map(#[source] nix::Error),
    #[error("mlockall failed: {0}")]
    Lock(#[source] nix::Error),
}

/// Anonymous, private, pre-faulted mapping that lives until dropped.
///
/// Stable address for its whole lifetime, which the timing code relies on.
#[derive(Debug)]
pub struct MMappedMemory {
    pointer: NonNull<u8>,
    size: usize,
}

impl MMappedMemory {
    pub fn new(
        size: usize,
        initializer: impl Fn(usize) -> u8,
    ) -> Result<MMappedMemory, MMapError> {
        let length = NonZeroUsize::new(size).ok_or(MMapError::Empty)?;
        let flags = mman::MapFlags::MAP_PRIVATE | mman::MapFlags::MAP_POPULATE;
        let p = unsafe {
            mman::mmap_anonymous(
                None,
                length,
                mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
                flags,
            )
        }
        .map_err(MMapError::Map)?;
        let mut r = MMappedMemory {
            pointer: p.cast(),
            size,
        };
        for (i, byte) in r.slice_mut().iter_mut().enumerate() {
            *byte = initializer(i);
        }
        Ok(r)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.pointer.as_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.pointer.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn slice(&self) -> &[u8] {
        unsafe { from_raw_parts(self.pointer.as_ptr(), self.size) }
    }

    pub fn slice_mut(&mut self) -> &mut [u8] {
        unsafe { from_raw_parts_mut(self.pointer.as_ptr(), self.size) }
    }
}

impl Drop for MMappedMemory {
    fn drop(&mut self) {
        let p: NonNull<c_void> = self.pointer.cast();
        if let Err(e) = unsafe { mman::munmap(p, self.size) } {
            log::warn!("munmap of {:p} failed: {}", self.pointer, e);
        }
    }
}

impl Deref for MMappedMemory {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.slice()
    }
}

impl DerefMut for MMappedMemory {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slice_mut()
    }
}

/// Pin every current and future page of the process in RAM.
pub fn lock_all_memory() -> Result<(), MMapError> {
    mman::mlockall(mman::MlockAllFlags::MCL_CURRENT | mman::MlockAllFlags::MCL_FUTURE)
        .map_err(MMapError::Lock)
}

pub fn unlock_all_memory() -> Result<(), MMapError> {
    mman::munlockall().map_err(MMapError::Lock)
}

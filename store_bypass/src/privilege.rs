//! Process privileges needed to measure with interrupts masked.

use crate::HarnessError;
use cache_utils::mmap::{lock_all_memory, unlock_all_memory};
use core::marker::PhantomData;
use x86_64::instructions::interrupts;

/// Locked memory and I/O privilege level 3, held until dropped.
///
/// With every page resident and `cli`/`sti` allowed in ring 3, interrupts can
/// be masked around a batch of trials without a page fault ever needing them.
#[derive(Debug)]
pub struct MeasurementPrivileges {
    _private: (),
}

impl MeasurementPrivileges {
    pub fn acquire() -> Result<Self, HarnessError> {
        lock_all_memory().map_err(HarnessError::MemoryLock)?;
        if unsafe { libc::iopl(3) } != 0 {
            let e = std::io::Error::last_os_error();
            if let Err(unlock) = unlock_all_memory() {
                log::warn!("{}", unlock);
            }
            return Err(HarnessError::IoPrivilege(e));
        }
        log::info!("Memory locked, running at iopl 3");
        Ok(MeasurementPrivileges { _private: () })
    }

    /// Mask maskable interrupts until the guard is dropped.
    pub fn disable_interrupts(&self) -> InterruptsDisabled<'_> {
        interrupts::disable();
        InterruptsDisabled {
            _privileges: PhantomData,
            _not_send: PhantomData,
        }
    }
}

impl Drop for MeasurementPrivileges {
    fn drop(&mut self) {
        if unsafe { libc::iopl(0) } != 0 {
            log::warn!("iopl(0) failed: {}", std::io::Error::last_os_error());
        }
        if let Err(e) = unlock_all_memory() {
            log::warn!("{}", e);
        }
    }
}

/// Interrupts stay masked on this thread while this lives.
///
/// Tied to the privileges that made `cli` legal and to the current thread.
#[must_use]
pub struct InterruptsDisabled<'a> {
    _privileges: PhantomData<&'a MeasurementPrivileges>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for InterruptsDisabled<'_> {
    fn drop(&mut self) {
        interrupts::enable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "needs CAP_SYS_RAWIO and CAP_IPC_LOCK"]
    fn interrupts_come_back_after_the_guard() {
        let privileges = MeasurementPrivileges::acquire().unwrap();
        {
            let _guard = privileges.disable_interrupts();
            assert!(!interrupts::are_enabled());
        }
        assert!(interrupts::are_enabled());
    }
}

//! Instruction cache invalidation.
//!
//! After new instructions are written through the data cache they must
//! become visible to instruction fetch. ARM cores keep split,
//! non-coherent I/D caches and need an explicit flush; x86 guarantees
//! store-to-fetch coherency in hardware and needs nothing.

use crate::types::HookError;

/// Flush the CPU instruction cache for `[addr, addr + len)`.
///
/// On architectures with a coherent instruction cache this is a no-op
/// that still reports success. That relaxation is assumed safe for the
/// hardware we target but has not been verified for every core; treat
/// it as an assumption, not an invariant.
pub fn flush_instructions(addr: usize, len: usize) -> Result<(), HookError> {
    #[cfg(target_arch = "aarch64")]
    {
        extern "C" {
            // Compiler builtin; does the DC CVAU / IC IVAU / ISB dance.
            fn __clear_cache(begin: *mut libc::c_void, end: *mut libc::c_void);
        }
        unsafe {
            __clear_cache(addr as *mut libc::c_void, (addr + len) as *mut libc::c_void);
        }
        Ok(())
    }

    #[cfg(target_arch = "arm")]
    {
        // __ARM_NR_cacheflush; bionic's cacheflush() wraps the same number.
        const ARM_NR_CACHEFLUSH: libc::c_long = 0x0f0002;
        let ret = unsafe { libc::syscall(ARM_NR_CACHEFLUSH, addr, addr + len, 0usize) };
        if ret == -1 {
            let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
            log::debug!("cacheflush(0x{addr:x}, {len}) failed: errno {errno}");
            return Err(HookError::CacheFlushFailed(errno));
        }
        Ok(())
    }

    #[cfg(not(any(target_arch = "aarch64", target_arch = "arm")))]
    {
        let _ = (addr, len);
        Ok(())
    }
}

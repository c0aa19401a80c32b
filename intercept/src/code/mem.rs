//! Page protection, executable mappings, and raw byte copies.
//!
//! The caller owns the correctness of every address and length passed
//! here; the copies do no bounds checking beyond what the slice types
//! already guarantee.

use log::{debug, warn};

use crate::types::HookError;

#[inline]
fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[inline]
fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Make `[addr, addr + len)` readable, writable and executable.
///
/// Aligns down to the page containing `addr` and widens the length by
/// the alignment slack. The protection is deliberately left at RWX:
/// patched code must stay executable for the rest of the process
/// lifetime, so the original protection is never restored.
pub fn unprotect(addr: usize, len: usize) -> Result<(), HookError> {
    let alignment = addr % page_size();
    let ret = unsafe {
        libc::mprotect(
            (addr - alignment) as *mut libc::c_void,
            alignment + len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )
    };
    if ret != 0 {
        let errno = last_errno();
        debug!("mprotect(0x{addr:x}, {len}) failed: errno {errno}");
        return Err(HookError::ProtectionFailed(errno));
    }
    Ok(())
}

/// Map `len` bytes of anonymous, private, read+write+execute memory.
pub fn alloc_executable(len: usize) -> Result<*mut u8, HookError> {
    let ptr = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        debug!("mmap({len}) failed: errno {}", last_errno());
        return Err(HookError::AllocationFailed);
    }
    Ok(ptr as *mut u8)
}

/// Unmap a prior [`alloc_executable`] mapping. Best-effort: a failure
/// is logged and otherwise ignored.
pub fn free_executable(addr: usize, len: usize) {
    let ret = unsafe { libc::munmap(addr as *mut libc::c_void, len) };
    if ret != 0 {
        warn!("munmap(0x{addr:x}, {len}) failed: errno {}", last_errno());
    }
}

/// Copy `len` bytes from `src` to `dst`, byte order preserved.
///
/// # Safety
/// Both ranges must be valid for the access; they may overlap.
pub unsafe fn raw_copy(src: usize, dst: usize, len: usize) {
    core::ptr::copy(src as *const u8, dst as *mut u8, len);
}

/// Write a caller-supplied buffer into process memory at `dst`.
///
/// # Safety
/// `dst` must be writable for `bytes.len()` bytes.
pub unsafe fn copy_in(bytes: &[u8], dst: usize) {
    core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst as *mut u8, bytes.len());
}

/// Read `len` bytes of process memory at `src` into a fresh buffer.
///
/// # Safety
/// `src` must be readable for `len` bytes.
pub unsafe fn copy_out(src: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    core::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), len);
    out
}

//! Process-wide thread quiescence.
//!
//! The runtime's own suspend-all machinery is reached through the
//! scoped-suspend constructor/destructor pair in the entry table. The
//! controller hands the constructor a fixed-size opaque allocation and
//! never interprets its contents; the pointer is only carried from
//! pause to resume. Pause and resume must bracket exactly: a pause that
//! is never resumed leaves every other thread of the process stopped.

use core::ffi::{c_char, c_void};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};

use crate::entries::EntryTable;
use crate::error::EngineError;

/// Cause string reported to the runtime's suspend machinery; it shows
/// up in runtime logs while the world is stopped.
const SUSPEND_CAUSE: &[u8] = b"arthook-patch\0";

/// Backing storage handed to the runtime's scoped suspend object. The
/// real object is a handful of bytes; 64 covers every known layout.
const SCOPE_BYTES: usize = 64;

static SUSPEND_IN_FLIGHT: AtomicBool = AtomicBool::new(false);

/// Proof that every other thread of the process is paused.
///
/// Move-only; consumed by exactly one [`resume_all`]. On releases below
/// the hardened minimum the token is inert (nothing was paused because
/// nothing else writes code pages there), but the bracket discipline is
/// identical.
pub struct SuspendToken {
    scope: *mut [u8; SCOPE_BYTES],
}

unsafe impl Send for SuspendToken {}

impl Drop for SuspendToken {
    fn drop(&mut self) {
        if !self.scope.is_null() {
            // Dropping without resume_all leaves the process quiesced;
            // there is nothing safe to do here except make noise.
            error!("SuspendToken dropped without resume_all; process stays paused");
        }
    }
}

/// Pause every other thread of the process.
///
/// At most one bracket may be outstanding: the underlying primitive is
/// not reentrant, so a second pause before the matching resume returns
/// [`EngineError::SuspendInFlight`] instead of being forwarded.
pub fn suspend_all(table: &EntryTable) -> Result<SuspendToken, EngineError> {
    if SUSPEND_IN_FLIGHT.swap(true, Ordering::AcqRel) {
        return Err(EngineError::SuspendInFlight);
    }

    if !table.release().needs_quiescence() {
        return Ok(SuspendToken { scope: core::ptr::null_mut() });
    }

    let Some(ctor) = table.suspend_all else {
        SUSPEND_IN_FLIGHT.store(false, Ordering::Release);
        return Err(EngineError::MissingCapability("suspend-all"));
    };

    let scope = Box::into_raw(Box::new([0u8; SCOPE_BYTES]));
    debug!("suspending all threads");
    unsafe { ctor(scope as *mut c_void, SUSPEND_CAUSE.as_ptr() as *const c_char, false) };
    Ok(SuspendToken { scope })
}

#[cfg(test)]
pub(crate) fn bracket_is_free() -> bool {
    !SUSPEND_IN_FLIGHT.load(Ordering::SeqCst)
}

/// Resume the threads paused by the matching [`suspend_all`].
pub fn resume_all(table: &EntryTable, token: SuspendToken) {
    let scope = token.scope;
    core::mem::forget(token);

    if !scope.is_null() {
        if let Some(dtor) = table.resume_all {
            debug!("resuming all threads");
            unsafe { dtor(scope as *mut c_void) };
        }
        drop(unsafe { Box::from_raw(scope) });
    }
    SUSPEND_IN_FLIGHT.store(false, Ordering::Release);
}

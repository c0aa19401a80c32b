//! On-demand JIT compilation of a target method.
//!
//! Dispatches on the calling-convention shape recorded at resolve time.
//! A `false` return means no new compiled code can be assumed to exist
//! anywhere; the caller retries later or falls back to interpreter-level
//! hooking. Nothing here retries on its own.

use core::ffi::c_void;
use std::mem;

use log::{debug, warn};

use crate::entries::{CompileShape, EntryTable};
use crate::ffi::{
    CompileFlagPairFn, CompileOsrFlagFn, CompileRegionFlagPairFn, CompileRegionKindFn,
};
use crate::method::MethodHandle;

/// `CompilationKind::kOptimized` on releases with the enum shape.
const COMPILATION_KIND_OPTIMIZED: i32 = 1;

/// Ask the runtime's JIT to compile `method` now, on behalf of the
/// calling thread's `thread` context. Returns whether the runtime
/// reported success.
pub fn compile_now(
    table: &EntryTable,
    method: MethodHandle,
    thread: crate::ffi::ThreadContext,
) -> bool {
    let Some(entry) = table.compile_method else {
        debug!("compile-method entry not bound on {}; skipping", table.release());
        return false;
    };

    let method = match table.decode_method(method) {
        Ok(m) => m,
        Err(e) => {
            warn!("method decode failed: {e}");
            return false;
        }
    };

    let compiler = table.compiler_handle;
    let ok = match entry.shape {
        CompileShape::OsrFlag => {
            let f: CompileOsrFlagFn = unsafe { mem::transmute(entry.raw) };
            unsafe { f(compiler, method.as_ptr(), thread, false) }
        }
        CompileShape::FlagPair => {
            let f: CompileFlagPairFn = unsafe { mem::transmute(entry.raw) };
            unsafe { f(compiler, method.as_ptr(), thread, false, false) }
        }
        CompileShape::RegionFlagPair => {
            let Some(region) = current_region(table) else { return false };
            let f: CompileRegionFlagPairFn = unsafe { mem::transmute(entry.raw) };
            unsafe { f(compiler, thread, region, method.as_ptr(), false, false) }
        }
        CompileShape::RegionKind => {
            let Some(region) = current_region(table) else { return false };
            let f: CompileRegionKindFn = unsafe { mem::transmute(entry.raw) };
            unsafe { f(compiler, thread, region, method.as_ptr(), COMPILATION_KIND_OPTIMIZED) }
        }
    };

    if !ok {
        debug!("runtime declined to compile method {:#x}", method.0);
    }
    ok
}

/// The JIT memory region compile requests target from R on, read off
/// the code-cache object discovered at resolve time.
fn current_region(table: &EntryTable) -> Option<*mut c_void> {
    let Some(get) = table.get_current_region else {
        warn!("get-current-jit-region entry not bound");
        return None;
    };
    let Some(cache) = table.anchors.as_ref().and_then(|a| a.jit_code_cache) else {
        warn!("jit code cache object not anchored");
        return None;
    };
    Some(unsafe { get(cache) })
}

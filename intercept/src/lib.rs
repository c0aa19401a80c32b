//! arthook-intercept: process-local code patching primitives.
//!
//! Everything in this crate is runtime-agnostic: page protection,
//! instruction cache control, executable mappings, raw copies, and a
//! loaded-module/symbol-table walker that can see past dynamic-linker
//! namespace restrictions. The ART-specific binding lives in
//! `arthook-runtime` on top of these primitives.

pub mod code;
pub mod module;
pub mod types;

pub use types::HookError;

/// Process-global lock for tests that modify executable memory.
///
/// Tests that patch or re-protect code pages must hold this lock to
/// prevent concurrent mprotect cycles on the same pages.
#[cfg(test)]
pub(crate) fn lock_patch_tests() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}

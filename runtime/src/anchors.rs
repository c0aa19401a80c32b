//! Locating internal runtime objects off the global `Runtime` instance.
//!
//! ART exports no accessors for the objects the newer entry points are
//! invoked on (`JniIdManager`, `JitCodeCache`, `ClassLinker`), but it
//! does export the `Runtime::instance_` data symbol. The fields we need
//! sit in a stable neighborhood around the `java_vm_` smart pointer;
//! in pointer-sized slots, R and later:
//!
//! ```text
//! class Runtime {
//!     ...
//!     ClassLinker* class_linker_;                      // anchor - 3
//!     SignalCatcher* signal_catcher_;                  // anchor - 2
//!     unique_ptr<jni::JniIdManager> jni_id_manager_;   // anchor - 1
//!     unique_ptr<JavaVMExt> java_vm_;                  // anchor
//!     unique_ptr<jit::Jit> jit_;                       // anchor + 1
//!     unique_ptr<jit::JitCodeCache> jit_code_cache_;   // anchor + 2
//!     ...
//! };
//! ```
//!
//! The anchor slot is found by scanning the instance for the `JavaVM`
//! pointer the caller received from the runtime, so field drift ahead
//! of the neighborhood does not move the binding. The relative offsets
//! are a reverse-engineered contract per release line, not a public
//! interface.

use core::ffi::c_void;

use log::{debug, warn};

use arthook_intercept::module;

use crate::ffi::JavaVm;
use crate::release::{Release, API_R};
use crate::symbols;

/// How far into the `Runtime` instance the `java_vm_` slot is searched.
const ANCHOR_SCAN_SLOTS: usize = 512;

/// Slot offsets relative to the `java_vm_` anchor.
struct SlotLayout {
    jni_id_manager: isize,
    class_linker: isize,
    jit_code_cache: isize,
}

fn layout_for(release: Release) -> Option<SlotLayout> {
    if release.at_least(API_R) {
        Some(SlotLayout { jni_id_manager: -1, class_linker: -3, jit_code_cache: 2 })
    } else {
        // Earlier releases need none of these objects.
        None
    }
}

/// Internal runtime objects recovered from the `Runtime` instance.
///
/// Raw pointers into the runtime's own heap; owned by the runtime,
/// valid for the process lifetime, never freed by this crate.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeAnchors {
    pub runtime: *mut c_void,
    pub jni_id_manager: Option<*mut c_void>,
    pub class_linker: Option<*mut c_void>,
    pub jit_code_cache: Option<*mut c_void>,
}

impl RuntimeAnchors {
    /// Read the anchored objects for `release`, or `None` when the
    /// release needs none of them or the instance cannot be found.
    pub(crate) fn locate(release: Release, java_vm: JavaVm) -> Option<RuntimeAnchors> {
        let layout = layout_for(release)?;

        let instance_slot = match module::find_symbol(symbols::LIBART, symbols::RUNTIME_INSTANCE) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("{} not found: {e}", symbols::RUNTIME_INSTANCE);
                return None;
            }
        };
        let runtime = unsafe { *(instance_slot as *const *mut c_void) };
        if runtime.is_null() {
            warn!("Runtime::instance_ is null");
            return None;
        }

        let slots = runtime as *const *mut c_void;
        let Some(anchor) = (unsafe { find_anchor_slot(slots, java_vm, ANCHOR_SCAN_SLOTS) }) else {
            warn!("JavaVM anchor not found in Runtime instance");
            return None;
        };
        debug!("Runtime java_vm_ anchor at slot {anchor}");

        let read = |delta: isize| -> Option<*mut c_void> {
            let index = anchor as isize + delta;
            if index < 0 {
                return None;
            }
            let p = unsafe { *slots.add(index as usize) };
            (!p.is_null()).then_some(p)
        };

        Some(RuntimeAnchors {
            runtime,
            jni_id_manager: read(layout.jni_id_manager),
            class_linker: read(layout.class_linker),
            jit_code_cache: read(layout.jit_code_cache),
        })
    }
}

/// Scan up to `limit` pointer slots of `object` for `wanted`.
///
/// # Safety
/// `object` must be readable for `limit` pointer-sized slots.
unsafe fn find_anchor_slot(
    object: *const *mut c_void,
    wanted: *mut c_void,
    limit: usize,
) -> Option<usize> {
    (0..limit).find(|&i| *object.add(i) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_scan_finds_slot() {
        let wanted = 0xA11C_E000usize as *mut c_void;
        let mut object = [core::ptr::null_mut::<c_void>(); 16];
        object[7] = wanted;
        let found = unsafe { find_anchor_slot(object.as_ptr(), wanted, object.len()) };
        assert_eq!(found, Some(7));
    }

    #[test]
    fn anchor_scan_respects_limit() {
        let wanted = 0xA11C_E000usize as *mut c_void;
        let mut object = [core::ptr::null_mut::<c_void>(); 16];
        object[12] = wanted;
        let found = unsafe { find_anchor_slot(object.as_ptr(), wanted, 8) };
        assert_eq!(found, None);
    }

    #[test]
    fn layout_exists_only_from_r() {
        assert!(layout_for(crate::release::API_Q).is_none());
        assert!(layout_for(crate::release::API_R).is_some());
        assert!(layout_for(crate::release::API_S).is_some());
    }
}

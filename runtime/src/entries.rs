//! Per-release resolution of the entry points this engine binds.
//!
//! The table is built exactly once per process. Below N the names
//! resolve through ordinary `dlsym`; from N on the dynamic linker hides
//! them behind namespaces, so the resolver walks the module's symbol
//! tables directly. Optional entries that do not exist on the running
//! release are simply left absent (the subsystems they back degrade
//! and can be probed), while a missing mandatory entry fails the whole
//! initialization rather than returning a partially usable table.

use core::ffi::c_void;
use std::mem;

use log::{debug, info};
use thiserror::Error;

use arthook_intercept::module;

use crate::anchors::RuntimeAnchors;
use crate::error::EngineError;
use crate::ffi::{
    AddWeakGlobalRefFn, DecodeMethodIdFn, GetCurrentRegionFn, JavaVm, JitLoadFn,
    MakeVisiblyInitializedFn, ResumeAllFn, SuspendAllFn,
};
use crate::method::MethodHandle;
use crate::release::{Release, API_Q, API_R, API_S};
use crate::symbols;

#[derive(Debug, Error)]
pub enum BindError {
    /// No symbol/shape mapping exists for this release; there is no
    /// safe fallback, so initialization fails outright.
    #[error("unsupported runtime release {0}")]
    UnsupportedRelease(Release),

    #[error("runtime library `{0}` could not be loaded")]
    LibraryNotLoaded(&'static str),

    /// A mandatory entry point did not resolve on a release that
    /// requires it.
    #[error("entry point `{0}` did not resolve")]
    UnresolvedEntry(&'static str),
}

/// Parameter shape of the resolved compile entry, recorded at resolve
/// time so call sites dispatch without re-deriving the release logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileShape {
    /// `(compiler, method, thread, osr)` on N through P.
    OsrFlag,
    /// `(compiler, method, thread, baseline, osr)` on Q.
    FlagPair,
    /// `(compiler, thread, region, method, baseline, osr)` on R.
    RegionFlagPair,
    /// `(compiler, thread, region, method, kind)` on S and later.
    RegionKind,
}

pub(crate) fn compile_shape(release: Release) -> CompileShape {
    if release.at_least(API_S) {
        CompileShape::RegionKind
    } else if release.at_least(API_R) {
        CompileShape::RegionFlagPair
    } else if release.at_least(API_Q) {
        CompileShape::FlagPair
    } else {
        CompileShape::OsrFlag
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CompileEntry {
    pub raw: usize,
    pub shape: CompileShape,
}

/// Every entry point the engine binds, resolved once per process.
///
/// An entry is either absent (the operation does not exist on this
/// release) or valid for the process lifetime: never freed, never
/// reassigned. The table may be read concurrently without
/// synchronization.
pub struct EntryTable {
    pub(crate) release: Release,
    pub(crate) java_vm: JavaVm,
    pub(crate) add_weak_global_ref: Option<AddWeakGlobalRefFn>,
    pub(crate) suspend_all: Option<SuspendAllFn>,
    pub(crate) resume_all: Option<ResumeAllFn>,
    pub(crate) compile_method: Option<CompileEntry>,
    pub(crate) compiler_handle: *mut c_void,
    pub(crate) get_current_region: Option<GetCurrentRegionFn>,
    pub(crate) decode_method_id: Option<DecodeMethodIdFn>,
    pub(crate) make_visibly_initialized: Option<MakeVisiblyInitializedFn>,
    pub(crate) anchors: Option<RuntimeAnchors>,
}

// Written once at resolve time, read-only afterwards; the raw pointers
// are process-global runtime state.
unsafe impl Send for EntryTable {}
unsafe impl Sync for EntryTable {}

impl EntryTable {
    /// Bind the entry points for `release`. `java_vm` is the `JavaVM*`
    /// the runtime handed to `JNI_OnLoad`; it anchors both the object
    /// bridge and the runtime-instance field discovery.
    ///
    /// Loads `libart.so` (and `libart-compiler.so` where the release
    /// has a JIT) if they are not already mapped; in a live runtime
    /// process they always are, so this is idempotent.
    pub fn resolve(release: Release, java_vm: JavaVm) -> Result<Self, BindError> {
        if !release.is_supported() {
            return Err(BindError::UnsupportedRelease(release));
        }

        module::ensure_loaded(symbols::LIBART)
            .map_err(|_| BindError::LibraryNotLoaded(symbols::LIBART))?;

        let mut table = EntryTable {
            release,
            java_vm,
            add_weak_global_ref: None,
            suspend_all: None,
            resume_all: None,
            compile_method: None,
            compiler_handle: core::ptr::null_mut(),
            get_current_region: None,
            decode_method_id: None,
            make_visibly_initialized: None,
            anchors: None,
        };

        table.add_weak_global_ref = lookup(release, symbols::LIBART, symbols::weak_ref_symbol(release))
            .map(|a| unsafe { mem::transmute::<usize, AddWeakGlobalRefFn>(a) });

        if release.has_jit() {
            module::ensure_loaded(symbols::LIBART_COMPILER)
                .map_err(|_| BindError::LibraryNotLoaded(symbols::LIBART_COMPILER))?;

            table.suspend_all = lookup(release, symbols::LIBART, symbols::SCOPED_SUSPEND_ALL_CTOR)
                .map(|a| unsafe { mem::transmute::<usize, SuspendAllFn>(a) });
            table.resume_all = lookup(release, symbols::LIBART, symbols::SCOPED_SUSPEND_ALL_DTOR)
                .map(|a| unsafe { mem::transmute::<usize, ResumeAllFn>(a) });

            // The compiler handle from jit_load is required by every
            // compile request and is created exactly once.
            if let Some(load) = lookup(release, symbols::LIBART_COMPILER, symbols::JIT_LOAD)
                .map(|a| unsafe { mem::transmute::<usize, JitLoadFn>(a) })
            {
                let mut generate_debug_info = false;
                table.compiler_handle = unsafe { load(&mut generate_debug_info) };
            }

            table.compile_method =
                lookup(release, symbols::LIBART_COMPILER, symbols::compile_method_symbol(release))
                    .map(|raw| CompileEntry { raw, shape: compile_shape(release) });
        }

        if release.has_indirect_method_ids() {
            table.decode_method_id =
                lookup(release, symbols::LIBART, symbols::JNI_ID_MANAGER_DECODE_METHOD_ID)
                    .map(|a| unsafe { mem::transmute::<usize, DecodeMethodIdFn>(a) });
            table.get_current_region =
                lookup(release, symbols::LIBART, symbols::JIT_CODE_CACHE_GET_CURRENT_REGION)
                    .map(|a| unsafe { mem::transmute::<usize, GetCurrentRegionFn>(a) });
            table.make_visibly_initialized =
                lookup(release, symbols::LIBART, symbols::MAKE_CLASSES_VISIBLY_INITIALIZED)
                    .map(|a| unsafe { mem::transmute::<usize, MakeVisiblyInitializedFn>(a) });
            table.anchors = RuntimeAnchors::locate(release, java_vm);
        }

        table.check_mandatory()?;
        info!("entry table bound for {release}");
        Ok(table)
    }

    /// A table is only handed out complete: every operation the release
    /// supports either resolved or initialization fails here.
    fn check_mandatory(&self) -> Result<(), BindError> {
        if self.release.has_jit() {
            if self.suspend_all.is_none() {
                return Err(BindError::UnresolvedEntry("suspend-all"));
            }
            if self.resume_all.is_none() {
                return Err(BindError::UnresolvedEntry("resume-all"));
            }
            if self.compiler_handle.is_null() {
                return Err(BindError::UnresolvedEntry("jit-load"));
            }
            if self.compile_method.is_none() {
                return Err(BindError::UnresolvedEntry("compile-method"));
            }
        }
        if self.release.has_indirect_method_ids() {
            if self.decode_method_id.is_none() {
                return Err(BindError::UnresolvedEntry("decode-method-id"));
            }
            if self.get_current_region.is_none() {
                return Err(BindError::UnresolvedEntry("get-current-jit-region"));
            }
            match &self.anchors {
                Some(a) if a.jni_id_manager.is_some() && a.jit_code_cache.is_some() => {}
                _ => return Err(BindError::UnresolvedEntry("runtime-anchors")),
            }
            // make-classes-visibly-initialized stays optional.
        }
        Ok(())
    }

    pub fn release(&self) -> Release {
        self.release
    }

    pub fn java_vm(&self) -> JavaVm {
        self.java_vm
    }

    /// Shape of the bound compile entry, if the release has a JIT.
    pub fn compile_shape(&self) -> Option<CompileShape> {
        self.compile_method.map(|e| e.shape)
    }

    pub fn is_bridge_available(&self) -> bool {
        self.add_weak_global_ref.is_some()
    }

    /// Normalize a raw method identifier to a direct `ArtMethod*`.
    ///
    /// Direct handles pass through untouched, so decoding is
    /// idempotent; indirect ids are routed through the runtime's id
    /// manager exactly once.
    pub fn decode_method(&self, handle: MethodHandle) -> Result<MethodHandle, EngineError> {
        if !handle.is_indirect() {
            return Ok(handle);
        }
        let decode = self
            .decode_method_id
            .ok_or(EngineError::MissingCapability("decode-method-id"))?;
        let manager = self
            .anchors
            .as_ref()
            .and_then(|a| a.jni_id_manager)
            .ok_or(EngineError::MissingCapability("jni-id-manager"))?;
        let decoded = unsafe { decode(manager, handle.0) };
        debug!("decoded method id {:#x} -> {:p}", handle.0, decoded);
        Ok(MethodHandle(decoded as usize))
    }
}

fn lookup(release: Release, lib: &'static str, symbol: &'static str) -> Option<usize> {
    let found = if release.needs_table_walk() {
        module::find_symbol(lib, symbol)
    } else {
        module::find_export(lib, symbol)
    };
    match found {
        Ok(addr) => {
            debug!("{symbol} -> {addr:#x}");
            Some(addr)
        }
        Err(e) => {
            debug!("{symbol}: {e}");
            None
        }
    }
}

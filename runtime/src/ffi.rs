//! Function-pointer shapes of the resolved entry points.
//!
//! Collected in one place so the transmutes in the resolver line up
//! with the call sites. Nothing outside the resolver and the stub
//! tables in tests conjures these from raw addresses.

use core::ffi::{c_char, c_void};

/// `JavaVM*` as handed to `JNI_OnLoad`; points at the runtime's
/// `JavaVMExt`.
pub type JavaVm = *mut c_void;

/// `art::Thread*` of the calling thread (the managed thread's
/// `nativePeer`). Supplied by the caller on every operation that the
/// runtime attributes to a thread.
pub type ThreadContext = *mut c_void;

/// Raw `art::mirror::Object*` (or other internal object pointer).
pub type RawObject = *mut c_void;

/// A JNI reference usable by the managed caller.
pub type ObjectHandle = *mut c_void;

/// `AddWeakGlobalRef{,erence}(JavaVM*, Thread*, Object*)`
pub type AddWeakGlobalRefFn =
    unsafe extern "C" fn(JavaVm, ThreadContext, RawObject) -> ObjectHandle;

/// `ScopedSuspendAll::ScopedSuspendAll(char const* cause, bool long_suspend)`,
/// invoked against caller-provided backing storage.
pub type SuspendAllFn = unsafe extern "C" fn(*mut c_void, *const c_char, bool);

/// `ScopedSuspendAll::~ScopedSuspendAll()`
pub type ResumeAllFn = unsafe extern "C" fn(*mut c_void);

/// `jit_load(bool* generate_debug_info)`; returns the compiler handle
/// required by every compile request.
pub type JitLoadFn = unsafe extern "C" fn(*mut bool) -> *mut c_void;

/// `(compiler, method, thread, osr)` on N through P.
pub type CompileOsrFlagFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, ThreadContext, bool) -> bool;

/// `(compiler, method, thread, baseline, osr)` on Q.
pub type CompileFlagPairFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, ThreadContext, bool, bool) -> bool;

/// `(compiler, thread, region, method, baseline, osr)` on R.
pub type CompileRegionFlagPairFn =
    unsafe extern "C" fn(*mut c_void, ThreadContext, *mut c_void, *mut c_void, bool, bool) -> bool;

/// `(compiler, thread, region, method, kind)` on S and later.
pub type CompileRegionKindFn =
    unsafe extern "C" fn(*mut c_void, ThreadContext, *mut c_void, *mut c_void, i32) -> bool;

/// `JitCodeCache::GetCurrentRegion()`, called on the code-cache object.
pub type GetCurrentRegionFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// `JniIdManager::DecodeMethodId(jmethodID)`, called on the id manager.
pub type DecodeMethodIdFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

/// `ClassLinker::MakeInitializedClassesVisiblyInitialized(Thread*, bool wait)`,
/// called on the class linker.
pub type MakeVisiblyInitializedFn = unsafe extern "C" fn(*mut c_void, ThreadContext, bool);

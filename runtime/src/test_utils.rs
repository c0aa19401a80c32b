//! Shared test doubles for the runtime crate.
//!
//! Entry tables whose entries are ordinary Rust functions, so the
//! release-dependent machinery (suspend brackets, compile-shape
//! dispatch, id decoding, the patch applier) runs without a live ART.
//! The suspend stub models the real contract: after the constructor
//! returns, cooperating worker threads (everything built on [`tick`])
//! make no progress until the destructor runs.

use core::ffi::{c_char, c_void};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::anchors::RuntimeAnchors;
use crate::entries::{compile_shape, CompileEntry, CompileShape, EntryTable};
use crate::ffi::{
    AddWeakGlobalRefFn, CompileFlagPairFn, CompileOsrFlagFn, CompileRegionFlagPairFn,
    CompileRegionKindFn, DecodeMethodIdFn, GetCurrentRegionFn, JavaVm, MakeVisiblyInitializedFn,
    ObjectHandle, RawObject, ResumeAllFn, SuspendAllFn, ThreadContext,
};
use crate::release::Release;

static PAUSED: AtomicBool = AtomicBool::new(false);
static IN_TICK: AtomicBool = AtomicBool::new(false);
static REGION_QUERIES: AtomicUsize = AtomicUsize::new(0);
static LAST_COMPILE: Mutex<Option<CompileCall>> = Mutex::new(None);

const REGION_SENTINEL: usize = 0x5E91;

/// What the compile stubs saw on their last invocation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompileCall {
    pub shape: CompileShape,
    pub method: usize,
    pub used_region: bool,
    pub kind: Option<i32>,
}

/// Process-global lock: the stub statics (and the suspend bracket) are
/// shared, so tests that use stub tables serialize on this.
pub(crate) fn lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn reset_stubs() {
    PAUSED.store(false, Ordering::SeqCst);
    REGION_QUERIES.store(0, Ordering::SeqCst);
    *LAST_COMPILE.lock().unwrap() = None;
}

pub(crate) fn world_is_paused() -> bool {
    PAUSED.load(Ordering::SeqCst)
}

pub(crate) fn region_queries() -> usize {
    REGION_QUERIES.load(Ordering::SeqCst)
}

pub(crate) fn last_compile() -> Option<CompileCall> {
    *LAST_COMPILE.lock().unwrap()
}

pub(crate) fn thread_context() -> ThreadContext {
    0x7EAD as ThreadContext
}

/// Run `work` only while the world is not paused, holding the tick flag
/// the suspend stub waits on. Worker threads in tests go through this,
/// which makes a returned `suspend_all` mean they are truly parked.
pub(crate) fn tick(work: impl FnOnce()) {
    IN_TICK.store(true, Ordering::SeqCst);
    if !PAUSED.load(Ordering::SeqCst) {
        work();
    }
    IN_TICK.store(false, Ordering::SeqCst);
}

unsafe extern "C" fn stub_suspend_all(scope: *mut c_void, _cause: *const c_char, _long: bool) {
    assert!(!scope.is_null(), "suspend ctor needs backing storage");
    PAUSED.store(true, Ordering::SeqCst);
    // Wait for in-flight ticks to drain, as the real suspend waits for
    // every thread to reach a suspend point.
    while IN_TICK.load(Ordering::SeqCst) {
        core::hint::spin_loop();
    }
}

unsafe extern "C" fn stub_resume_all(scope: *mut c_void) {
    assert!(!scope.is_null());
    PAUSED.store(false, Ordering::SeqCst);
}

unsafe extern "C" fn stub_weak_ref(_vm: JavaVm, _thread: ThreadContext, raw: RawObject) -> ObjectHandle {
    raw
}

unsafe extern "C" fn stub_decode_method_id(_manager: *mut c_void, id: usize) -> *mut c_void {
    (id & !1) as *mut c_void
}

unsafe extern "C" fn stub_get_current_region(_cache: *mut c_void) -> *mut c_void {
    REGION_QUERIES.fetch_add(1, Ordering::SeqCst);
    REGION_SENTINEL as *mut c_void
}

unsafe extern "C" fn stub_make_visibly_initialized(
    _linker: *mut c_void,
    _thread: ThreadContext,
    _wait: bool,
) {
}

fn record_compile(shape: CompileShape, method: usize, used_region: bool, kind: Option<i32>) {
    *LAST_COMPILE.lock().unwrap() = Some(CompileCall { shape, method, used_region, kind });
}

unsafe extern "C" fn stub_compile_osr(
    _compiler: *mut c_void,
    method: *mut c_void,
    _thread: ThreadContext,
    _osr: bool,
) -> bool {
    record_compile(CompileShape::OsrFlag, method as usize, false, None);
    true
}

unsafe extern "C" fn stub_compile_flag_pair(
    _compiler: *mut c_void,
    method: *mut c_void,
    _thread: ThreadContext,
    _baseline: bool,
    _osr: bool,
) -> bool {
    record_compile(CompileShape::FlagPair, method as usize, false, None);
    true
}

unsafe extern "C" fn stub_compile_region_flag_pair(
    _compiler: *mut c_void,
    _thread: ThreadContext,
    region: *mut c_void,
    method: *mut c_void,
    _baseline: bool,
    _osr: bool,
) -> bool {
    assert_eq!(region as usize, REGION_SENTINEL, "region must come from the code cache");
    record_compile(CompileShape::RegionFlagPair, method as usize, true, None);
    true
}

unsafe extern "C" fn stub_compile_region_kind(
    _compiler: *mut c_void,
    _thread: ThreadContext,
    region: *mut c_void,
    method: *mut c_void,
    kind: i32,
) -> bool {
    assert_eq!(region as usize, REGION_SENTINEL, "region must come from the code cache");
    record_compile(CompileShape::RegionKind, method as usize, true, Some(kind));
    true
}

/// A complete stub table for `release`, with exactly the entries the
/// release would have bound.
pub(crate) fn stub_table(release: Release) -> EntryTable {
    let mut table = EntryTable {
        release,
        java_vm: 0x7A7A as JavaVm,
        add_weak_global_ref: Some(stub_weak_ref as AddWeakGlobalRefFn),
        suspend_all: None,
        resume_all: None,
        compile_method: None,
        compiler_handle: core::ptr::null_mut(),
        get_current_region: None,
        decode_method_id: None,
        make_visibly_initialized: None,
        anchors: None,
    };

    if release.has_jit() {
        table.suspend_all = Some(stub_suspend_all as SuspendAllFn);
        table.resume_all = Some(stub_resume_all as ResumeAllFn);
        table.compiler_handle = 0xC0DE as *mut c_void;
        let shape = compile_shape(release);
        let raw = match shape {
            CompileShape::OsrFlag => stub_compile_osr as CompileOsrFlagFn as usize,
            CompileShape::FlagPair => stub_compile_flag_pair as CompileFlagPairFn as usize,
            CompileShape::RegionFlagPair => {
                stub_compile_region_flag_pair as CompileRegionFlagPairFn as usize
            }
            CompileShape::RegionKind => stub_compile_region_kind as CompileRegionKindFn as usize,
        };
        table.compile_method = Some(CompileEntry { raw, shape });
    }

    if release.has_indirect_method_ids() {
        table.decode_method_id = Some(stub_decode_method_id as DecodeMethodIdFn);
        table.get_current_region = Some(stub_get_current_region as GetCurrentRegionFn);
        table.make_visibly_initialized =
            Some(stub_make_visibly_initialized as MakeVisiblyInitializedFn);
        table.anchors = Some(RuntimeAnchors {
            runtime: 0x1000 as *mut c_void,
            jni_id_manager: Some(0x2000 as *mut c_void),
            class_linker: Some(0x3000 as *mut c_void),
            jit_code_cache: Some(0x4000 as *mut c_void),
        });
    }

    table
}

/// A stub table whose weak-global-ref entry deliberately failed to
/// resolve, for probing the bridge-unavailable path.
pub(crate) fn stub_table_without_bridge(release: Release) -> EntryTable {
    let mut table = stub_table(release);
    table.add_weak_global_ref = None;
    table
}

//! The process-wide engine surface.
//!
//! One [`Engine`] per process: the captured release plus the resolved
//! entry table, built at first use behind a `OnceLock` and torn down
//! only at process exit. The table is read-only, so the engine may be
//! shared freely; per-hook operations themselves must be serialized by
//! a single logical caller, since the underlying pause primitive is not
//! reentrant.

use std::sync::OnceLock;

use anyhow::Context;
use log::debug;

use arthook_intercept::{code, HookError};

use crate::bridge;
use crate::entries::{BindError, EntryTable};
use crate::error::EngineError;
use crate::ffi::{JavaVm, ObjectHandle, RawObject, ThreadContext};
use crate::jit;
use crate::method::MethodHandle;
use crate::patch::{self, CodeRegion};
use crate::release::Release;
use crate::suspend::{self, SuspendToken};

static ENGINE: OnceLock<Engine> = OnceLock::new();

pub struct Engine {
    entries: EntryTable,
}

impl Engine {
    /// Initialize the process-wide engine at first use. A later call
    /// returns the existing instance; the table is never rebuilt.
    pub fn init(release: Release, java_vm: JavaVm) -> Result<&'static Engine, BindError> {
        if let Some(engine) = ENGINE.get() {
            return Ok(engine);
        }
        let entries = EntryTable::resolve(release, java_vm)?;
        Ok(ENGINE.get_or_init(|| Engine { entries }))
    }

    /// Detect the device release and initialize. For callers that do
    /// not track API levels themselves.
    pub fn bootstrap(java_vm: JavaVm) -> anyhow::Result<&'static Engine> {
        let release =
            Release::detect().context("runtime release could not be determined")?;
        Engine::init(release, java_vm)
            .with_context(|| format!("entry-point resolution failed for {release}"))
    }

    pub fn get() -> Option<&'static Engine> {
        ENGINE.get()
    }

    #[cfg(test)]
    pub(crate) fn with_entries(entries: EntryTable) -> Engine {
        Engine { entries }
    }

    pub fn release(&self) -> Release {
        self.entries.release()
    }

    pub fn entries(&self) -> &EntryTable {
        &self.entries
    }

    // ---- memory access ---------------------------------------------------

    pub fn alloc_executable(&self, len: usize) -> Result<*mut u8, HookError> {
        code::alloc_executable(len)
    }

    pub fn free_executable(&self, addr: usize, len: usize) {
        code::free_executable(addr, len);
    }

    /// See [`code::raw_copy`].
    ///
    /// # Safety
    /// Both ranges must be valid for the access.
    pub unsafe fn raw_copy(&self, src: usize, dst: usize, len: usize) {
        code::raw_copy(src, dst, len);
    }

    /// # Safety
    /// `dst` must be writable for `bytes.len()` bytes.
    pub unsafe fn copy_in(&self, bytes: &[u8], dst: usize) {
        code::copy_in(bytes, dst);
    }

    /// # Safety
    /// `src` must be readable for `len` bytes.
    pub unsafe fn copy_out(&self, src: usize, len: usize) -> Vec<u8> {
        code::copy_out(src, len)
    }

    pub fn unprotect(&self, addr: usize, len: usize) -> Result<(), HookError> {
        code::unprotect(addr, len)
    }

    pub fn flush_instructions(&self, addr: usize, len: usize) -> Result<(), HookError> {
        code::flush_instructions(addr, len)
    }

    // ---- runtime operations ----------------------------------------------

    /// Normalize a raw method identifier to a direct `ArtMethod*`,
    /// decoding indirect ids through the runtime. Idempotent.
    pub fn resolve_method_handle(&self, handle: MethodHandle) -> Result<MethodHandle, EngineError> {
        self.entries.decode_method(handle)
    }

    /// Ask the JIT to compile `method` now. `false` means no compiled
    /// code exists anywhere; retry or fall back to interpreter hooks.
    pub fn compile_method(&self, method: MethodHandle, thread: ThreadContext) -> bool {
        jit::compile_now(&self.entries, method, thread)
    }

    /// Pause every other thread. Must be paired with exactly one
    /// [`Engine::resume_all`]; see the quiescence contract there.
    pub fn suspend_all(&self) -> Result<SuspendToken, EngineError> {
        suspend::suspend_all(&self.entries)
    }

    pub fn resume_all(&self, token: SuspendToken) {
        suspend::resume_all(&self.entries, token);
    }

    pub fn is_bridge_available(&self) -> bool {
        bridge::is_available(&self.entries)
    }

    /// Wrap a raw object pointer as a reference the managed caller can
    /// hold. `None` when the bridge is unavailable on this release.
    pub fn wrap_as_object(&self, thread: ThreadContext, raw: RawObject) -> Option<ObjectHandle> {
        bridge::wrap_as_object(&self.entries, thread, raw)
    }

    /// Flush the class linker's pending initialized-class states so a
    /// freshly patched method cannot trap on a not-yet-visible class.
    /// No-op below R, where the state does not exist.
    pub fn make_classes_visibly_initialized(&self, thread: ThreadContext) {
        let (Some(entry), Some(linker)) = (
            self.entries.make_visibly_initialized,
            self.entries.anchors.as_ref().and_then(|a| a.class_linker),
        ) else {
            debug!("make-classes-visibly-initialized not bound; skipping");
            return;
        };
        unsafe { entry(linker, thread, true) };
    }

    /// Install `payload` over the generated code at `target`.
    ///
    /// `size_of_direct_jump` is the length of the overwritten range at
    /// `target`; `pc` and `size_of_bridge_jump` describe the range
    /// whose instruction cache must be refreshed. The write is made
    /// atomic against all other threads on releases that need it.
    pub fn apply_patch(
        &self,
        target: usize,
        pc: usize,
        size_of_direct_jump: usize,
        size_of_bridge_jump: usize,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        let region = CodeRegion {
            address: target,
            length: size_of_direct_jump,
            icache_address: pc,
            icache_length: size_of_bridge_jump,
        };
        patch::apply_patch(&self.entries, region, payload, self.release().needs_quiescence())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{API_N, API_R};
    use crate::suspend;
    use crate::test_utils;

    #[test]
    fn engine_is_absent_until_initialized() {
        // Nothing in the test suite initializes the global engine; the
        // accessor must stay empty rather than conjure one.
        assert!(Engine::get().is_none());
    }

    #[test]
    fn minimum_hardened_release_installs_an_eight_byte_stub() {
        let _ = env_logger::builder().is_test(true).try_init();
        let _g = test_utils::lock();
        test_utils::reset_stubs();
        let engine = Engine::with_entries(test_utils::stub_table(API_N));

        let buf = engine.alloc_executable(4096).expect("alloc") as usize;
        let stub = [0xD2u8, 0x80, 0x00, 0x10, 0xD6, 0x1F, 0x02, 0x00];

        engine
            .apply_patch(buf, buf, stub.len(), stub.len(), &stub)
            .expect("apply_patch");

        assert_eq!(unsafe { engine.copy_out(buf, stub.len()) }, stub);
        assert!(suspend::bracket_is_free(), "no token may remain outstanding");
        assert!(!test_utils::world_is_paused());

        engine.free_executable(buf, 4096);
    }

    #[test]
    fn direct_handles_resolve_to_themselves() {
        let _g = test_utils::lock();
        let engine = Engine::with_entries(test_utils::stub_table(API_R));
        let direct = MethodHandle(0x9000);
        assert_eq!(engine.resolve_method_handle(direct).unwrap(), direct);
    }

    #[test]
    fn visibly_initialized_is_silent_when_unbound() {
        let _g = test_utils::lock();
        let engine = Engine::with_entries(test_utils::stub_table(API_N));
        // Pre-R table has no entry; must be a quiet no-op.
        engine.make_classes_visibly_initialized(test_utils::thread_context());
    }

    #[test]
    fn memory_surface_round_trips_through_engine() {
        let _g = test_utils::lock();
        let engine = Engine::with_entries(test_utils::stub_table(API_N));

        let a = engine.alloc_executable(4096).expect("alloc a") as usize;
        let b = engine.alloc_executable(4096).expect("alloc b") as usize;
        unsafe {
            engine.copy_in(b"\xAA\xBB\xCC\xDD", a);
            engine.raw_copy(a, b, 4);
            assert_eq!(engine.copy_out(b, 4), b"\xAA\xBB\xCC\xDD");
        }
        engine.unprotect(a, 16).expect("unprotect");
        engine.flush_instructions(a, 16).expect("flush");

        engine.free_executable(a, 4096);
        engine.free_executable(b, 4096);
    }
}

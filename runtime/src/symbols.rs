//! Mangled names of the ART internals this engine binds to.
//!
//! The underlying C++ evolves between releases, so several logical
//! operations have more than one mangled spelling; the chooser
//! functions pick the one valid for the running release. Names were
//! recovered from the corresponding ART release branches.

use crate::release::{Release, API_O, API_R, API_S};

pub const LIBART: &str = "libart.so";
pub const LIBART_COMPILER: &str = "libart-compiler.so";

/// `art::JavaVMExt::AddWeakGlobalRef(art::Thread*, art::mirror::Object*)`
pub const ADD_WEAK_GLOBAL_REF: &str =
    "_ZN3art9JavaVMExt16AddWeakGlobalRefEPNS_6ThreadEPNS_6mirror6ObjectE";

/// `art::JavaVMExt::AddWeakGlobalRef(art::Thread*, art::ObjPtr<art::mirror::Object>)`
pub const ADD_WEAK_GLOBAL_REF_OBJPTR: &str =
    "_ZN3art9JavaVMExt16AddWeakGlobalRefEPNS_6ThreadENS_6ObjPtrINS_6mirror6ObjectEEE";

/// `art::ScopedSuspendAll::ScopedSuspendAll(char const*, bool)`
pub const SCOPED_SUSPEND_ALL_CTOR: &str = "_ZN3art16ScopedSuspendAllC1EPKcb";

/// `art::ScopedSuspendAll::~ScopedSuspendAll()`
pub const SCOPED_SUSPEND_ALL_DTOR: &str = "_ZN3art16ScopedSuspendAllD1Ev";

/// C entry of libart-compiler: `jit_load(bool* generate_debug_info)`.
pub const JIT_LOAD: &str = "jit_load";

/// C entry of libart-compiler, N through Q.
pub const JIT_COMPILE_METHOD: &str = "jit_compile_method";

/// `art::jit::JitCompiler::CompileMethod(Thread*, JitMemoryRegion*, ArtMethod*, bool, bool)`
pub const JIT_COMPILE_METHOD_REGION: &str =
    "_ZN3art3jit11JitCompiler13CompileMethodEPNS_6ThreadEPNS0_15JitMemoryRegionEPNS_9ArtMethodEbb";

/// `art::jit::JitCompiler::CompileMethod(Thread*, JitMemoryRegion*, ArtMethod*, CompilationKind)`
pub const JIT_COMPILE_METHOD_KIND: &str =
    "_ZN3art3jit11JitCompiler13CompileMethodEPNS_6ThreadEPNS0_15JitMemoryRegionEPNS_9ArtMethodENS_15CompilationKindE";

/// `art::jit::JitCodeCache::GetCurrentRegion()`
pub const JIT_CODE_CACHE_GET_CURRENT_REGION: &str =
    "_ZN3art3jit12JitCodeCache16GetCurrentRegionEv";

/// `art::jni::JniIdManager::DecodeMethodId(_jmethodID*)`
pub const JNI_ID_MANAGER_DECODE_METHOD_ID: &str =
    "_ZN3art3jni12JniIdManager14DecodeMethodIdEP10_jmethodID";

/// `art::ClassLinker::MakeInitializedClassesVisiblyInitialized(art::Thread*, bool)`
pub const MAKE_CLASSES_VISIBLY_INITIALIZED: &str =
    "_ZN3art11ClassLinker40MakeInitializedClassesVisiblyInitializedEPNS_6ThreadEb";

/// Exported data symbol holding the global `art::Runtime*`.
pub const RUNTIME_INSTANCE: &str = "_ZN3art7Runtime9instance_E";

/// Weak-global-reference creation, per release.
pub fn weak_ref_symbol(release: Release) -> &'static str {
    if release.at_least(API_O) {
        ADD_WEAK_GLOBAL_REF_OBJPTR
    } else {
        ADD_WEAK_GLOBAL_REF
    }
}

/// JIT compile entry inside libart-compiler, per release.
pub fn compile_method_symbol(release: Release) -> &'static str {
    if release.at_least(API_S) {
        JIT_COMPILE_METHOD_KIND
    } else if release.at_least(API_R) {
        JIT_COMPILE_METHOD_REGION
    } else {
        JIT_COMPILE_METHOD
    }
}

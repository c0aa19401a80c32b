//! Runtime release identification.
//!
//! The running ART's ABI generation is its Android API level. It is
//! captured once at startup and never changes; every release-dependent
//! decision in this crate keys off this value through the predicates
//! below rather than repeating raw comparisons at call sites.

use core::fmt;

use log::debug;

/// Android API level of the running ART instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Release(pub u32);

/// Android 6.0: `AddWeakGlobalReference` renamed to `AddWeakGlobalRef`.
pub const API_M: Release = Release(23);
/// Android 7.0: linker namespaces hide internal symbols, the JIT
/// compiler appears, and code patches start racing the JIT thread.
pub const API_N: Release = Release(24);
/// Android 8.0: `AddWeakGlobalRef` takes an `ObjPtr` wrapper.
pub const API_O: Release = Release(26);
/// Android 10: `CompileMethod` grows a second boolean.
pub const API_Q: Release = Release(29);
/// Android 11: indirect jmethodIDs, `JitMemoryRegion` parameter,
/// `MakeInitializedClassesVisiblyInitialized`.
pub const API_R: Release = Release(30);
/// Android 12: a `CompilationKind` enumerator replaces the boolean pair.
pub const API_S: Release = Release(31);

pub const MIN_SUPPORTED: Release = API_M;
pub const MAX_SUPPORTED: Release = Release(34);

/// Environment override for the detected release, for bring-up on
/// hosts without the system property.
const RELEASE_OVERRIDE_VAR: &str = "ARTHOOK_RELEASE";

impl Release {
    pub const fn api_level(self) -> u32 {
        self.0
    }

    pub const fn at_least(self, other: Release) -> bool {
        self.0 >= other.0
    }

    pub const fn is_supported(self) -> bool {
        self.0 >= MIN_SUPPORTED.0 && self.0 <= MAX_SUPPORTED.0
    }

    /// Public `dlsym` stops resolving internal names from N on; the
    /// resolver must walk the symbol tables itself.
    pub const fn needs_table_walk(self) -> bool {
        self.at_least(API_N)
    }

    /// From N on the JIT thread may rewrite code-page protection
    /// concurrently; a patch is only atomic under a process-wide pause.
    pub const fn needs_quiescence(self) -> bool {
        self.at_least(API_N)
    }

    pub const fn has_jit(self) -> bool {
        self.at_least(API_N)
    }

    /// From R on a raw jmethodID may be an indirect id that has to be
    /// decoded before use as an `ArtMethod*`.
    pub const fn has_indirect_method_ids(self) -> bool {
        self.at_least(API_R)
    }

    /// Capture the device release: `ARTHOOK_RELEASE` if set, otherwise
    /// the `ro.build.version.sdk` system property.
    pub fn detect() -> Option<Release> {
        if let Ok(value) = std::env::var(RELEASE_OVERRIDE_VAR) {
            match value.trim().parse::<u32>() {
                Ok(level) => {
                    debug!("release override: API {level}");
                    return Some(Release(level));
                }
                Err(_) => debug!("ignoring unparsable {RELEASE_OVERRIDE_VAR}={value}"),
            }
        }
        system_sdk_level().map(Release)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API {}", self.0)
    }
}

#[cfg(target_os = "android")]
fn system_sdk_level() -> Option<u32> {
    use core::ffi::c_char;

    extern "C" {
        fn __system_property_get(name: *const c_char, value: *mut c_char) -> libc::c_int;
    }

    // PROP_VALUE_MAX
    let mut value = [0u8; 92];
    let len = unsafe {
        __system_property_get(
            b"ro.build.version.sdk\0".as_ptr() as *const c_char,
            value.as_mut_ptr() as *mut c_char,
        )
    };
    if len <= 0 {
        return None;
    }
    std::str::from_utf8(&value[..len as usize]).ok()?.trim().parse().ok()
}

#[cfg(not(target_os = "android"))]
fn system_sdk_level() -> Option<u32> {
    None
}

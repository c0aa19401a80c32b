use core::fmt;

/// Low-level failure modes of the patching primitives.
///
/// This engine runs inside a host process where unwinding across the
/// native boundary is not safe, so every failure is a plain value;
/// nothing in this crate panics on an error path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    /// mprotect(2) refused the protection change; carries errno.
    ProtectionFailed(i32),
    /// An anonymous executable mapping could not be created.
    AllocationFailed,
    /// The instruction cache could not be flushed; carries errno.
    CacheFlushFailed(i32),
    /// The module is not loaded in this process and could not be loaded.
    ModuleNotFound,
    /// The symbol is absent from the module's symbol tables.
    SymbolNotFound,
    /// No implementation for this OS or architecture.
    Unsupported,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::ProtectionFailed(errno) => {
                write!(f, "memory protection change failed (errno {errno})")
            }
            HookError::AllocationFailed => write!(f, "executable mapping failed"),
            HookError::CacheFlushFailed(errno) => {
                write!(f, "instruction cache flush failed (errno {errno})")
            }
            HookError::ModuleNotFound => write!(f, "module not loaded"),
            HookError::SymbolNotFound => write!(f, "symbol not found"),
            HookError::Unsupported => write!(f, "unsupported platform"),
        }
    }
}

impl std::error::Error for HookError {}

/// A shared object (or the main executable) mapped into this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub path: String,
    pub base_address: usize,
    pub size: usize,
}


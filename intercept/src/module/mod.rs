#[cfg(any(target_os = "linux", target_os = "android"))]
mod linux;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::*;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod fallback {
    use crate::types::{HookError, ModuleInfo};

    pub fn enumerate_modules() -> Vec<ModuleInfo> {
        Vec::new()
    }

    pub fn find_module_by_name(_name: &str) -> Option<ModuleInfo> {
        None
    }

    pub fn ensure_loaded(_name: &str) -> Result<(), HookError> {
        Err(HookError::Unsupported)
    }

    pub fn find_export(_module_name: &str, _symbol: &str) -> Result<usize, HookError> {
        Err(HookError::Unsupported)
    }

    pub fn find_symbol(_module_name: &str, _symbol: &str) -> Result<usize, HookError> {
        Err(HookError::Unsupported)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub use fallback::*;

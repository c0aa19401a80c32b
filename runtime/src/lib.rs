//! arthook-runtime: version-adaptive binding to ART internals.
//!
//! This crate turns a release-identified ART process into a patchable
//! one. [`Engine::init`] resolves the private entry points the engine
//! needs for the running release (reference creation, thread
//! quiescence, JIT invocation, code-cache introspection, id decoding)
//! into a process-wide, read-only [`EntryTable`]; afterwards per-hook
//! operations go through the [`Engine`] surface: compiling a method on
//! demand, pausing the world, and writing a jump patch over generated
//! code atomically with respect to every other thread.
//!
//! What bytes to write, and where control ultimately transfers, is the
//! caller's business; this crate only makes the write safe and
//! visible.

pub mod anchors;
pub mod bridge;
pub mod engine;
pub mod entries;
pub mod error;
pub mod ffi;
pub mod jit;
pub mod method;
pub mod patch;
pub mod release;
pub mod suspend;
pub mod symbols;

#[cfg(test)]
mod test_utils;

pub use engine::Engine;
pub use entries::{BindError, CompileShape, EntryTable};
pub use error::EngineError;
pub use method::MethodHandle;
pub use patch::CodeRegion;
pub use release::Release;
pub use suspend::SuspendToken;

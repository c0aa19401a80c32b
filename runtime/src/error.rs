use arthook_intercept::HookError;
use thiserror::Error;

/// Failure modes of the per-operation engine surface.
///
/// Initialization failures are [`crate::BindError`]; everything after a
/// successful bind is reported here. Nothing unwinds across the native
/// boundary: each of these is an ordinary return value.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The entry backing this capability was left unresolved on the
    /// running release. Callers are expected to probe availability
    /// before relying on the capability.
    #[error("capability `{0}` is not available on this release")]
    MissingCapability(&'static str),

    /// A suspend-all bracket is already outstanding. The runtime's
    /// pause primitive is not reentrant; a nested pause would be
    /// undefined behavior inside the runtime, so it is refused here.
    #[error("a suspend-all bracket is already outstanding")]
    SuspendInFlight,

    #[error(transparent)]
    Memory(#[from] HookError),
}

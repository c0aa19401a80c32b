//! Bridging raw runtime object pointers back into JNI references.
//!
//! A raw `mirror::Object*` is useless to managed code until it is
//! registered with the reference tables; the bridge runs it through the
//! runtime's weak-global-reference creation entry. The returned handle
//! has the same lifetime and ownership semantics as any other external
//! reference into the object graph; the bridge only creates it.

use log::debug;

use crate::entries::EntryTable;
use crate::ffi::{ObjectHandle, RawObject, ThreadContext};

/// Whether the creation entry resolved on this release. Callers probe
/// this up front instead of interpreting a `None` from
/// [`wrap_as_object`] after the fact.
pub fn is_available(table: &EntryTable) -> bool {
    table.is_bridge_available()
}

/// Wrap a raw object pointer as a reference consumable by the managed
/// caller. `None` when the creation entry is unresolved or the runtime
/// returned nothing; never an error.
pub fn wrap_as_object(
    table: &EntryTable,
    thread: ThreadContext,
    raw: RawObject,
) -> Option<ObjectHandle> {
    let Some(create) = table.add_weak_global_ref else {
        debug!("weak-global-ref entry not bound; bridge unavailable");
        return None;
    };
    let handle = unsafe { create(table.java_vm(), thread, raw) };
    if handle.is_null() {
        return None;
    }
    Some(handle)
}

//! The patch applier: quiesce → protect → write → flush → resume.
//!
//! On hardened releases the runtime's background compiler may rewrite
//! protection bits or inspect the same code region concurrently, so the
//! protect+write pair is only atomic under a process-wide pause. The
//! one invariant that must never break: a successful pause is matched
//! by exactly one resume, on every exit path including early failure.

use log::warn;

use arthook_intercept::code;

use crate::entries::EntryTable;
use crate::error::EngineError;
use crate::suspend;

/// A code range about to be overwritten, plus the range whose
/// instruction cache must be refreshed once the bytes are in place.
/// The protection of the written range is left at RWX afterwards.
#[derive(Debug, Clone, Copy)]
pub struct CodeRegion {
    pub address: usize,
    pub length: usize,
    pub icache_address: usize,
    pub icache_length: usize,
}

/// Write `payload` over the code described by `region`, atomically with
/// respect to every other thread when `needs_quiescence` is set.
///
/// An error means the protect step failed and nothing was written; a
/// failed instruction-cache flush after the write is logged but does
/// not roll anything back, since the bytes are already live in data
/// memory.
pub fn apply_patch(
    table: &EntryTable,
    region: CodeRegion,
    payload: &[u8],
    needs_quiescence: bool,
) -> Result<(), EngineError> {
    let token = if needs_quiescence { Some(suspend::suspend_all(table)?) } else { None };

    // No early return between here and resume_all: a paused world must
    // be resumed no matter how the write goes.
    let outcome = write_payload(region, payload);

    if let Some(token) = token {
        suspend::resume_all(table, token);
    }
    outcome
}

fn write_payload(region: CodeRegion, payload: &[u8]) -> Result<(), EngineError> {
    code::unprotect(region.address, region.length.max(payload.len()))?;
    unsafe { code::copy_in(payload, region.address) };
    if let Err(e) = code::flush_instructions(region.icache_address, region.icache_length) {
        warn!("instruction cache flush failed after patch write: {e}");
    }
    Ok(())
}

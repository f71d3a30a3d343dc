// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cache maintenance facade.
//!
//! Shared memory that crosses a non-coherent cache boundary needs explicit
//! writeback before the other side can see it, and explicit invalidate
//! before this side re-reads something the other side wrote. This module
//! hides that behind three operations and collapses all of them to no-ops
//! for regions the region registry has marked [`RegionAttributes::CACHE_COHERENT`].
//!
//! The actual cache maintenance instructions are architecture-specific and
//! live behind the [`CacheOps`] trait, implemented by the platform glue that
//! knows which core it's running on.

use xproc_abi::RegionAttributes;

/// Platform hook for the actual cache maintenance instructions.
///
/// Implementations operate on physical address ranges, not virtual ones --
/// by the time a call reaches this trait, the region registry has already
/// resolved a [`xproc_abi::SharedPtr`] to a `(phys_addr, len)` pair.
pub trait CacheOps {
    fn writeback(&self, phys_addr: u64, len: u32);
    fn invalidate(&self, phys_addr: u64, len: u32);
    fn writeback_invalidate(&self, phys_addr: u64, len: u32);
}

/// A [`CacheOps`] implementation that never touches hardware, for targets
/// that are always cache-coherent (or for unit tests).
pub struct NoopCache;

impl CacheOps for NoopCache {
    fn writeback(&self, _phys_addr: u64, _len: u32) {}
    fn invalidate(&self, _phys_addr: u64, _len: u32) {}
    fn writeback_invalidate(&self, _phys_addr: u64, _len: u32) {}
}

/// Performs a writeback if, and only if, `attrs` indicates the region is not
/// cache-coherent.
///
/// Call this after writing data another core will read.
pub fn writeback(ops: &impl CacheOps, attrs: RegionAttributes, phys_addr: u64, len: u32) {
    if !attrs.contains(RegionAttributes::CACHE_COHERENT) {
        ops.writeback(phys_addr, len);
    }
}

/// Performs an invalidate if, and only if, `attrs` indicates the region is
/// not cache-coherent.
///
/// Call this before reading data another core may have written, to discard
/// any stale cached copy of the range.
pub fn invalidate(ops: &impl CacheOps, attrs: RegionAttributes, phys_addr: u64, len: u32) {
    if !attrs.contains(RegionAttributes::CACHE_COHERENT) {
        ops.invalidate(phys_addr, len);
    }
}

/// Performs a combined writeback-invalidate if, and only if, `attrs`
/// indicates the region is not cache-coherent.
///
/// Useful for read-modify-write exchanges over a shared structure (e.g. the
/// config channel), where this side both wrote and is about to read
/// neighboring data in the same region.
pub fn writeback_invalidate(
    ops: &impl CacheOps,
    attrs: RegionAttributes,
    phys_addr: u64,
    len: u32,
) {
    if !attrs.contains(RegionAttributes::CACHE_COHERENT) {
        ops.writeback_invalidate(phys_addr, len);
    }
}

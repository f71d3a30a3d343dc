// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

bitflags! {
    /// Properties of a shared physical memory region, as recorded in the
    /// region registry.
    ///
    /// `CACHE_COHERENT` is the one that matters most: when it is set, the
    /// cache operations facade treats writeback/invalidate calls against
    /// this region as no-ops, because the hardware already keeps every
    /// core's view consistent.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
    #[repr(transparent)]
    pub struct RegionAttributes: u8 {
        /// Readable by the owning core.
        const READ = 1 << 0;
        /// Writable by the owning core.
        const WRITE = 1 << 1;
        /// Hardware keeps this region coherent across cores; cache
        /// maintenance ops against it are no-ops.
        const CACHE_COHERENT = 1 << 2;
        /// Region backs a device (mailbox FIFO, hardware spinlock bank)
        /// rather than plain memory; never cached regardless of
        /// `CACHE_COHERENT`.
        const DEVICE = 1 << 3;
    }
}

/// One entry in the shared-region registry: a physical carveout that one or
/// more cores have agreed to use for a particular purpose.
///
/// `base` and `size` are physical addresses; resolving a `SharedPtr` against
/// this entry means translating `base + offset` to whatever virtual mapping
/// the local core has for this region, which is local-core business the
/// registry doesn't track.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct RegionEntry {
    pub base: u64,
    pub size: u32,
    pub attrs: u8,
    _reserved: [u8; 3],
}

impl RegionEntry {
    pub fn new(base: u64, size: u32, attrs: RegionAttributes) -> Self {
        Self {
            base,
            size,
            attrs: attrs.bits(),
            _reserved: [0; 3],
        }
    }

    pub fn attributes(&self) -> RegionAttributes {
        RegionAttributes::from_bits_truncate(self.attrs)
    }

    /// True if `[offset, offset+len)` lies entirely within this region.
    pub fn covers(&self, offset: u32, len: u32) -> bool {
        match offset.checked_add(len) {
            Some(end) => end <= self.size,
            None => false,
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared-region registry.
//!
//! Maps the region ids carried inside [`SharedPtr`] to the physical
//! carveouts they refer to. This is the only place that turns a
//! `(region, offset)` pair into a real address -- everything downstream
//! (the gate registry, config channel, resource table processor) resolves
//! pointers through here rather than assuming a layout.

use xproc_abi::{Error, RegionEntry, SharedPtr};

/// Fixed-capacity table of known regions, indexed by region id.
///
/// Regions are registered once at bootstrap (from the resource table, or
/// from a fixed platform configuration) and never removed: a region going
/// away mid-run is a fault condition for any peer still holding pointers
/// into it, not something this registry arbitrates.
pub struct RegionTable<const N: usize> {
    entries: [Option<RegionEntry>; N],
}

impl<const N: usize> Default for RegionTable<N> {
    fn default() -> Self {
        Self {
            entries: [None; N],
        }
    }
}

impl<const N: usize> RegionTable<N> {
    pub fn register(&mut self, id: u16, entry: RegionEntry) -> Result<(), Error> {
        let slot = self.entries.get_mut(id as usize).ok_or(Error::UnknownRegion)?;
        *slot = Some(entry);
        Ok(())
    }

    pub fn get(&self, id: u16) -> Result<&RegionEntry, Error> {
        self.entries
            .get(id as usize)
            .and_then(|e| e.as_ref())
            .ok_or(Error::UnknownRegion)
    }

    /// Resolves `ptr` to a physical address, checking that `[offset, offset+len)`
    /// lies within the named region's bounds.
    pub fn resolve(&self, ptr: SharedPtr, len: u32) -> Result<u64, Error> {
        if !ptr.is_valid() {
            return Err(Error::UnknownRegion);
        }
        let entry = self.get(ptr.region())?;
        if !entry.covers(ptr.offset(), len) {
            return Err(Error::OutOfBounds);
        }
        Ok(entry.base + u64::from(ptr.offset()))
    }

    /// Inverse of [`RegionTable::resolve`]: turns a physical address known
    /// to lie inside region `id` back into a [`SharedPtr`].
    ///
    /// Used by the config channel and resource table processor, which both
    /// allocate physical memory and then need to splice the result into a
    /// shared linked list or table entry as a region-relative pointer
    /// instead of a bare address.
    pub fn to_shared_ptr(&self, id: u16, phys: u64) -> Result<SharedPtr, Error> {
        let entry = self.get(id)?;
        let offset = phys.checked_sub(entry.base).ok_or(Error::OutOfBounds)?;
        let offset: u32 = offset.try_into().map_err(|_| Error::OutOfBounds)?;
        if !entry.covers(offset, 0) {
            return Err(Error::OutOfBounds);
        }
        Ok(SharedPtr::new(id, offset))
    }
}

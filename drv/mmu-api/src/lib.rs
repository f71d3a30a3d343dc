// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client trait for mapping physical carveouts into this process's address
//! space.
//!
//! Two peers agreeing a region exists (via the region registry) doesn't
//! mean either of them can touch it yet -- on a host process, a carveout is
//! a range of physical memory that has to actually be mapped (via whatever
//! the platform's equivalent of `mmap` onto `/dev/mem` is) before a
//! `SharedPtr` into it resolves to something dereferenceable. `MmuMapper`
//! is that one operation, kept separate from the region registry itself so
//! tests can substitute an in-memory arena instead of touching real
//! physical memory.

use xproc_abi::Error;

/// Maps and unmaps physical address ranges into this process, handing back
/// a raw pointer to the mapping on success.
///
/// Implementations decide their own caching policy for repeated requests of
/// the same range; callers should not assume two calls with the same
/// arguments return the same pointer.
pub trait MmuMapper {
    /// # Safety
    /// The returned pointer is valid for `len` bytes only as long as the
    /// mapping has not been unmapped, and callers must not construct
    /// references that outlive a matching [`MmuMapper::unmap`] call.
    unsafe fn map(&mut self, phys_addr: u64, len: u32) -> Result<*mut u8, Error>;

    /// # Safety
    /// `phys_addr`/`len` must match a previous successful `map` call exactly.
    unsafe fn unmap(&mut self, phys_addr: u64, len: u32) -> Result<(), Error>;
}

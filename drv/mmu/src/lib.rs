// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Software MMU: an in-process arena standing in for real physical memory
//! mapping.
//!
//! Used by the test suite and by any host tool run without access to real
//! shared-memory hardware (e.g. `xproc-clusterd --simulate`). Every "map"
//! call hands back a pointer into a boxed arena rather than a real
//! `/dev/mem` mapping, so two peers running in the same process can
//! exercise the whole attach/gate/mailbox flow without any actual
//! cross-processor hardware underneath them.

use drv_xproc_mmu_api::MmuMapper;
use std::collections::HashMap;
use xproc_abi::Error;

struct Mapping {
    bytes: Box<[u8]>,
}

/// A software-only [`MmuMapper`] backed by a `HashMap` of boxed byte
/// arenas, keyed by physical address.
#[derive(Default)]
pub struct SoftwareMmu {
    mappings: HashMap<u64, Mapping>,
}

impl MmuMapper for SoftwareMmu {
    unsafe fn map(&mut self, phys_addr: u64, len: u32) -> Result<*mut u8, Error> {
        let mapping = self
            .mappings
            .entry(phys_addr)
            .or_insert_with(|| Mapping {
                bytes: vec![0u8; len as usize].into_boxed_slice(),
            });
        if mapping.bytes.len() < len as usize {
            return Err(Error::OutOfBounds);
        }
        Ok(mapping.bytes.as_mut_ptr())
    }

    unsafe fn unmap(&mut self, phys_addr: u64, _len: u32) -> Result<(), Error> {
        self.mappings
            .remove(&phys_addr)
            .map(|_| ())
            .ok_or(Error::UnknownRegion)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trait for locating the resource table inside a companion-core firmware
//! image.
//!
//! Before a resource table can be bootstrapped (see `xproc_kern::restable`)
//! something has to find it: the table lives at a fixed symbol or a fixed
//! section inside whatever firmware image format the remote core boots
//! from. This crate pulls that lookup behind a trait so `xproc-kern` never
//! has to know the image is ELF, and so the test suite can substitute a
//! fixed byte slice instead of parsing a real image.

use xproc_abi::Error;

/// The well-known section/symbol name firmware images use to mark their
/// resource table.
pub const RESOURCE_TABLE_SYMBOL: &str = "xproc_resource_table";

/// A parsed (or parseable) firmware image for a companion core.
pub trait FirmwareImage {
    /// Byte offset and length of the resource table within the image's
    /// backing bytes, as loaded at the image's link-time virtual address.
    fn resource_table(&self) -> Result<(u32, u32), Error>;

    /// The address the remote core should jump to after the table has been
    /// bootstrapped and the core is released from reset.
    fn entry_point(&self) -> u64;

    /// Raw bytes of the image, for slicing out the resource table content
    /// once its offset and length are known.
    fn bytes(&self) -> &[u8];
}

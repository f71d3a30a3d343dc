// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// The only resource table wire version this crate understands.
///
/// Companion firmware that declares a different version is rejected with
/// `MalformedResourceTable` rather than guessed at; there is exactly one
/// producer (the firmware build) and one consumer (the host loader) for
/// this format, so there is no compatibility matrix to maintain.
pub const RSC_TABLE_VERSION: u32 = 1;

/// Header of a resource table, as placed by the companion firmware's linker
/// script at a fixed, well-known offset in its image.
///
/// Followed immediately by `num_entries` little-endian `u32` offsets
/// (relative to the start of this header), each pointing to one
/// `ResourceEntryKind`-tagged entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ResourceTableHeader {
    pub version: u32,
    pub num_entries: u32,
    pub reserved: [u32; 2],
}

/// Tag byte identifying which entry variant follows a resource table
/// offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct ResourceEntryKind(u32);

impl ResourceEntryKind {
    pub const CARVEOUT: ResourceEntryKind = ResourceEntryKind(0);
    pub const DEVMEM: ResourceEntryKind = ResourceEntryKind(1);
    pub const TRACE: ResourceEntryKind = ResourceEntryKind(2);
    pub const VDEV: ResourceEntryKind = ResourceEntryKind(3);
    pub const CRASHDUMP: ResourceEntryKind = ResourceEntryKind(4);

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// A named memory carveout the firmware wants the host to allocate physical
/// backing for and patch back into the table before release from reset.
///
/// `da` ("device address") is the address the firmware will use to access
/// this memory once mapped; `pa` is filled in by the host loader after
/// allocation. A carveout with `pa` still zero when the firmware starts
/// running is a loader bug, not a firmware one -- the handshake does not
/// proceed to `procSyncStart` until every carveout is patched.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct CarveoutEntry {
    pub da: u64,
    pub pa: u64,
    pub len: u32,
    pub flags: u32,
    pub name: [u8; 32],
}

/// A fixed device-memory window the firmware expects to be mapped exactly
/// where it says -- never reallocated by the host, only validated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct DevmemEntry {
    pub da: u64,
    pub pa: u64,
    pub len: u32,
    pub name: [u8; 32],
}

/// Location of a firmware trace buffer the host should surface as
/// diagnostic output, analogous in spirit to `xproc-kern`'s ring buffer but
/// produced by the remote core instead of read locally.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct TraceEntry {
    pub da: u64,
    pub len: u32,
    pub name: [u8; 32],
}

/// A ring (one direction of a virtqueue-style transport) belonging to a
/// `VdevEntry`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct VringInfo {
    pub da: u64,
    pub align: u32,
    pub num_bufs: u32,
}

/// A virtual device exposed by the firmware: an identifier plus the rings it
/// needs backed. `num_vrings` bounds how many trailing `VringInfo` entries
/// immediately follow this header in the table -- the resource table
/// processor validates that the declared count does not overrun the table
/// before reading any of them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct VdevEntry {
    pub id: u32,
    pub notify_id: u32,
    pub num_vrings: u32,
    pub reserved: u32,
}

/// Location of a region the firmware wants preserved and surfaced to the
/// host if it crashes, so post-mortem tooling can read it back.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct CrashdumpEntry {
    pub da: u64,
    pub pa: u64,
    pub len: u32,
    pub name: [u8; 32],
}

/// One physical allocation the resource table processor made while walking
/// a table, reported back to the host loader so it can build its own
/// device-address-to-physical-address map independent of re-reading the
/// patched table bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryEntry {
    pub device_address: u64,
    pub phys_address: u64,
    pub len: u32,
    pub map_mask: u32,
    pub cache_enabled: bool,
}

/// The physical layout the resource table processor chose for one `VDEV`'s
/// rings and buffers, reported separately from `MemoryEntry` because a
/// `VdevEntry` carries no `pa` field of its own to patch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VringsDescriptor {
    pub vdev_id: u32,
    pub notify_id: u32,
    pub ring_phys_base: u64,
    pub buffer_phys_base: u64,
    pub total_len: u32,
}

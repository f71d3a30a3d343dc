// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// A reference into shared physical memory, expressed as a region id plus a
/// byte offset into that region -- never a native pointer.
///
/// Each peer may map the same physical carveout at a different virtual
/// address (or not map it at all until it needs to), so a `*mut T` written
/// by one core is meaningless read by another. `SharedPtr` is the type that
/// crosses the wire instead; each side resolves it to a local pointer by
/// looking up `region` in its own region registry and adding `offset`.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[repr(C)]
pub struct SharedPtr {
    region: u16,
    offset: u32,
}

impl SharedPtr {
    /// Sentinel for "no pointer", distinguishable from any valid
    /// `(region, offset)` pair because region `0xffff` is reserved and never
    /// allocated by the region registry.
    pub const INVALID: SharedPtr = SharedPtr {
        region: u16::MAX,
        offset: 0,
    };

    pub const fn new(region: u16, offset: u32) -> Self {
        Self { region, offset }
    }

    pub const fn is_valid(self) -> bool {
        self.region != u16::MAX
    }

    pub const fn region(self) -> u16 {
        self.region
    }

    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// Returns a pointer offset by `delta` bytes within the same region.
    ///
    /// Does not check that the result still lies inside the region; callers
    /// resolving a `SharedPtr` against the region registry get that check
    /// for free at resolution time.
    pub const fn byte_add(self, delta: u32) -> Self {
        Self {
            region: self.region,
            offset: self.offset.wrapping_add(delta),
        }
    }
}

impl Default for SharedPtr {
    fn default() -> Self {
        Self::INVALID
    }
}

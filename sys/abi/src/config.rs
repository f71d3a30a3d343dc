// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{CoreId, SharedPtr};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Sentinel `next` value marking the end of a config entry chain.
pub const CONFIG_LIST_END: SharedPtr = SharedPtr::INVALID;

/// What kind of payload follows a [`ConfigEntryHeader`].
///
/// Unknown kinds are skipped by walkers that don't care about them rather
/// than treated as an error -- the config channel is meant to grow new
/// entry kinds across firmware/host version combinations without either
/// side needing to agree on the full set in advance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct ConfigKind(pub u32);

impl ConfigKind {
    pub const CLOCK_RATE: ConfigKind = ConfigKind(0);
    pub const TRACE_LEVEL: ConfigKind = ConfigKind(1);
    pub const FEATURE_FLAGS: ConfigKind = ConfigKind(2);
}

/// One node of the config exchange channel's singly linked list.
///
/// The list lives entirely in shared memory; `next` is a [`SharedPtr`]
/// rather than a native pointer so either peer can walk it regardless of
/// how it has the backing region mapped. `len` bounds the payload that
/// immediately follows this header in memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ConfigEntryHeader {
    pub kind: ConfigKind,
    pub len: u32,
    pub next: SharedPtr,
    /// The core this entry's payload was written for.
    pub remote: CoreId,
    /// The core that wrote this entry.
    pub local: CoreId,
}

impl ConfigEntryHeader {
    pub fn new(kind: ConfigKind, len: u32, remote: CoreId, local: CoreId) -> Self {
        Self {
            kind,
            len,
            next: CONFIG_LIST_END,
            remote,
            local,
        }
    }

    pub fn is_end(&self) -> bool {
        !self.next.is_valid()
    }

    pub fn matches(&self, kind: ConfigKind, remote: CoreId, local: CoreId) -> bool {
        self.kind == kind && self.remote == remote && self.local == local
    }
}

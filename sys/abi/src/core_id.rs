// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Identifies one processor attached to the substrate: the host, or one of
/// its companion cores.
///
/// `CoreId` is a plain index, not a capability -- anyone holding one can ask
/// the name server or gate registry about it. It is never compared for
/// ordering beyond equality; core 0 is not privileged over core 1 except by
/// convention (core 0 is the host in every deployment we generate resource
/// tables for).
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
    Unaligned,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct CoreId(pub u8);

impl CoreId {
    /// The host processor in every topology this crate supports.
    pub const HOST: CoreId = CoreId(0);

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u8> for CoreId {
    fn from(v: u8) -> Self {
        CoreId(v)
    }
}

impl core::fmt::Display for CoreId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "core{}", self.0)
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::SharedPtr;

/// State of one reserved slot in the attach/detach handshake.
///
/// Transitions are one-directional: `Uninit -> Start -> Finish -> Detach`.
/// `procSyncStart` moves a slot from `Uninit` to `Start`; `procSyncFinish`
/// moves it from `Start` to `Finish`. Detaching moves it to `Detach`, after
/// which the slot is retired and never reused -- a fresh attach between the
/// same pair of cores allocates a new reserved slot rather than resetting
/// this one, so stale state from a crashed peer can never be mistaken for a
/// fresh handshake.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct StartedKey(u8);

impl StartedKey {
    pub const UNINIT: StartedKey = StartedKey(0);
    pub const START: StartedKey = StartedKey(1);
    pub const FINISH: StartedKey = StartedKey(2);
    pub const DETACH: StartedKey = StartedKey(3);

    /// Returns the slot this would become after a `procSyncStart` or
    /// `procSyncFinish` call, or `None` if the transition is not legal from
    /// the current state.
    pub fn advance(self) -> Option<StartedKey> {
        match self {
            StartedKey::UNINIT => Some(StartedKey::START),
            StartedKey::START => Some(StartedKey::FINISH),
            StartedKey::FINISH | StartedKey::DETACH => None,
            _ => None,
        }
    }

    pub fn detach(self) -> Option<StartedKey> {
        match self {
            StartedKey::FINISH => Some(StartedKey::DETACH),
            _ => None,
        }
    }

    pub fn is_attached(self) -> bool {
        self == StartedKey::FINISH
    }
}

impl Default for StartedKey {
    fn default() -> Self {
        StartedKey::UNINIT
    }
}

/// One reserved slot: the persistent state for a single ordered pair of
/// cores going through the attach/detach handshake.
///
/// The slot is reserved (allocated a fixed index) the first time either core
/// of the pair calls `procSyncStart`; it is never moved or compacted, so
/// both peers can agree on its index without a second round of negotiation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ReservedSlot {
    pub local: u8,
    pub remote: u8,
    pub state: StartedKey,
    _reserved: u8,
    /// Number of outstanding `attach` calls for this pair; `detach` only
    /// retires the slot once this reaches zero.
    pub attach_count: u32,
    /// Head of this slot's config-channel entry chain.
    pub config_list_head: SharedPtr,
    /// Region-0 pointer to whatever the notify sub-protocol allocated on
    /// attach, so detach can tear it back down.
    pub notify_ptr: SharedPtr,
    /// Region-0 pointer to this pair's published name-server entry, if any.
    pub nameserver_ptr: SharedPtr,
    /// Region-0 pointer to whatever the message-transport sub-protocol
    /// allocated on attach.
    pub transport_ptr: SharedPtr,
}

impl ReservedSlot {
    pub fn new(local: u8, remote: u8) -> Self {
        Self {
            local,
            remote,
            state: StartedKey::UNINIT,
            _reserved: 0,
            attach_count: 0,
            config_list_head: SharedPtr::INVALID,
            notify_ptr: SharedPtr::INVALID,
            nameserver_ptr: SharedPtr::INVALID,
            transport_ptr: SharedPtr::INVALID,
        }
    }

    pub fn matches(&self, local: u8, remote: u8) -> bool {
        self.local == local && self.remote == remote
    }
}

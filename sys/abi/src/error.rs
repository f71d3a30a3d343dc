// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Everything that can go wrong talking to the substrate.
///
/// This is a plain enum, not a boxed `dyn Error` or an opaque code, because
/// every variant here can occur in `no_std` kernel code running on a
/// companion core with no allocator. Host-side callers that want richer
/// context wrap this in `anyhow::Error` at the boundary where they have one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The peer named in a handshake or lookup is not a valid `CoreId` for
    /// this topology.
    UnknownPeer,

    /// A reserved slot was addressed in a state that does not permit the
    /// requested transition (e.g. `Finish` attempted from `Uninit`).
    BadSlotState,

    /// The attach handshake timed out waiting for the peer to publish its
    /// half of the reserved slot.
    AttachTimedOut,

    /// A detach was requested on a peer pair that was never attached.
    NotAttached,

    /// The gate registry has no free slots left for the requested
    /// remote-protection kind.
    GateRegistryFull,

    /// A gate name collided with one already registered for a different
    /// remote-protection kind under an aliasing rule that forbids it.
    GateAliasConflict,

    /// The requested gate handle does not refer to a live gate.
    InvalidGateHandle,

    /// Acquiring a gate would deadlock because this core already holds it.
    GateAlreadyHeld,

    /// A gate was released by a core that does not currently hold it.
    GateNotHeld,

    /// A `SharedPtr` referenced a region id with no matching entry in the
    /// region registry.
    UnknownRegion,

    /// A `SharedPtr` offset (plus the access length) fell outside the
    /// bounds of its region.
    OutOfBounds,

    /// The resource table header failed validation (bad magic, unsupported
    /// version, or a declared entry count that overruns the table).
    MalformedResourceTable,

    /// A resource table entry's type tag did not match any known
    /// `ResourceEntryKind`.
    UnknownResourceEntry,

    /// The mailbox dispatcher's bounded free list and pending queue are
    /// both exhausted; the event was dropped.
    MailboxQueueFull,

    /// No listener is registered for the peer that raised a mailbox event.
    NoListener,

    /// A listener was registered twice for the same peer without an
    /// intervening unregister.
    ListenerAlreadyRegistered,

    /// The config channel's linked list is malformed (a link pointer does
    /// not resolve to a valid region, or a cycle was detected while
    /// walking it).
    MalformedConfigChain,

    /// No config entry of the requested kind exists in the chain.
    ConfigEntryNotFound,

    /// A `read_config` payload buffer's length did not match the stored
    /// entry's recorded size.
    ConfigSizeMismatch,

    /// The gate registry's in-use bitmap for the requested remote-protection
    /// kind has no free resource id left.
    GateUnavailable,

    /// `attach` was called on a pair that is already attached; the
    /// reference count was incremented but the full sequence did not rerun.
    AlreadySetup,

    /// `detach`/`attach` was refused because the peer's half of the
    /// handshake is still mid-flight (`started-key == START`).
    NotReady,

    /// The SR-0 owner tried to detach from a peer while other peers are
    /// still attached to it.
    OwnerDetachRefused,

    /// A physical or region-0 allocation could not be satisfied.
    AllocationFailed,

    /// A `VDEV` entry's ring count, buffer count, or alignment failed
    /// validation.
    InvalidVdevDescriptor,

    /// A `DEVMEM` vring-window entry appeared with no preceding `VDEV`
    /// entry to satisfy it.
    VdevAfterDevmem,

    /// `delete` was called on a gate with outstanding opens.
    GateStillOpen,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::UnknownPeer => "unknown peer core id",
            Error::BadSlotState => "reserved slot in wrong state for transition",
            Error::AttachTimedOut => "attach handshake timed out",
            Error::NotAttached => "peer pair is not attached",
            Error::GateRegistryFull => "gate registry has no free slots",
            Error::GateAliasConflict => "gate name aliasing conflict",
            Error::InvalidGateHandle => "gate handle does not refer to a live gate",
            Error::GateAlreadyHeld => "gate already held by this core",
            Error::GateNotHeld => "gate released by a core that does not hold it",
            Error::UnknownRegion => "shared pointer names an unknown region",
            Error::OutOfBounds => "shared pointer access out of region bounds",
            Error::MalformedResourceTable => "resource table failed validation",
            Error::UnknownResourceEntry => "unrecognized resource table entry kind",
            Error::MailboxQueueFull => "mailbox event queue exhausted",
            Error::NoListener => "no listener registered for peer",
            Error::ListenerAlreadyRegistered => "listener already registered for peer",
            Error::MalformedConfigChain => "config channel chain is malformed",
            Error::ConfigEntryNotFound => "no config entry of requested kind",
            Error::ConfigSizeMismatch => "read_config buffer size does not match stored entry",
            Error::GateUnavailable => "gate registry bitmap has no free resource id",
            Error::AlreadySetup => "attach pair is already attached",
            Error::NotReady => "peer's handshake half is still mid-flight",
            Error::OwnerDetachRefused => "sr-0 owner cannot detach while other peers remain attached",
            Error::AllocationFailed => "physical or region-0 allocation could not be satisfied",
            Error::InvalidVdevDescriptor => "vdev entry failed vring/buffer/alignment validation",
            Error::VdevAfterDevmem => "devmem vring window has no preceding vdev entry",
            Error::GateStillOpen => "delete requested on a gate with outstanding opens",
        };
        f.write_str(msg)
    }
}

#[cfg(any(feature = "std", test))]
impl std::error::Error for Error {}

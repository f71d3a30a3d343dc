// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// What a gate protects against at the remote (cross-core) level.
///
/// These three kinds exist because the underlying hardware spinlock bank is
/// partitioned by convention: `System` locks are reserved for substrate use
/// (the gate registry itself, the name server), while `Custom1`/`Custom2`
/// are available to application code. The aliasing rules in
/// [`RemoteProtectionKind::aliases`] determine which kinds may share the
/// same underlying hardware spinlock when a name collides.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RemoteProtectionKind(u8);

impl RemoteProtectionKind {
    pub const SYSTEM: RemoteProtectionKind = RemoteProtectionKind(0);
    pub const CUSTOM1: RemoteProtectionKind = RemoteProtectionKind(1);
    pub const CUSTOM2: RemoteProtectionKind = RemoteProtectionKind(2);

    /// Whether a gate already registered as `self` may be reused for a
    /// lookup that asked for `other`.
    ///
    /// `custom1` aliases `system` and `custom2` aliases `custom1`, by
    /// design: both are narrowings of `system`'s exclusion, so a caller
    /// asking for the weaker kind may share a gate registered under the
    /// stronger one. The combination `custom2` vs `system` directly (with
    /// no intervening `custom1` registration) is rejected rather than
    /// silently chained through the transitive relationship, because the
    /// two kinds do not share a registration path in the gate registry's
    /// per-kind bitmap -- allowing it would require the registry to search
    /// all three bitmaps on every lookup instead of the caller's kind and
    /// its one direct alias.
    pub fn aliases(self, other: RemoteProtectionKind) -> bool {
        self == other
            || (self == RemoteProtectionKind::SYSTEM
                && other == RemoteProtectionKind::CUSTOM1)
            || (self == RemoteProtectionKind::CUSTOM1
                && other == RemoteProtectionKind::CUSTOM2)
    }
}

/// What a gate protects against at the local (intra-core) level, i.e. which
/// contexts on the current core must also be excluded while the gate is
/// held.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct LocalProtectionKind(u8);

impl LocalProtectionKind {
    /// No local exclusion; the hardware spinlock alone is the gate.
    pub const NONE: LocalProtectionKind = LocalProtectionKind(0);
    /// Exclude interrupt handlers (disable IRQs, or run inside one).
    pub const INTERRUPT: LocalProtectionKind = LocalProtectionKind(1);
    /// Exclude the task-level mailbox dispatcher half.
    pub const TASKLET: LocalProtectionKind = LocalProtectionKind(2);
    /// Exclude other threads/processes, no interrupt exclusion needed.
    pub const THREAD_PROCESS: LocalProtectionKind = LocalProtectionKind(3);
}

/// Whether a gate is currently free or held, and by whom.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GateStatus {
    Unused,
    Used,
    /// Allocated but not yet published through the name server; visible
    /// only to the core that reserved it.
    Reserved,
}

/// What kind of object a name-server entry refers to.
///
/// The name server is shared by gates and (in principle) other published
/// objects; `ObjectKind` lets a lookup fail fast with `UnknownResourceEntry`-
/// style errors rather than a type confusion if a name is reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(transparent)]
pub struct ObjectKind(u8);

impl ObjectKind {
    pub const GATE: ObjectKind = ObjectKind(0);
}

/// A gate as published through the cross-core name server: enough for a
/// remote core to find and open it without negotiating a fresh allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct GateDescriptor {
    /// Index into the owning core's hardware spinlock bank.
    pub hw_lock_index: u8,
    pub remote_kind: RemoteProtectionKind,
    pub local_kind: LocalProtectionKind,
    pub kind: ObjectKind,
    pub owner: crate::CoreId,
    _reserved: [u8; 3],
}

impl GateDescriptor {
    pub fn new(
        hw_lock_index: u8,
        remote_kind: RemoteProtectionKind,
        local_kind: LocalProtectionKind,
        owner: crate::CoreId,
    ) -> Self {
        Self {
            hw_lock_index,
            remote_kind,
            local_kind,
            kind: ObjectKind::GATE,
            owner,
            _reserved: [0; 3],
        }
    }
}

/// Why a gate handle exists: how it was brought into being, which in turn
/// decides what closing/dropping it does to the underlying resource id.
///
/// - `Local`: a statically-reserved gate (e.g. the SR-0 owner's default
///   gate at resource id 0) that no handle ever deletes.
/// - `CreateDynamic`: this handle's `create` call allocated the resource id;
///   `delete` requires `num_opens == 0` and frees the bitmap slot.
/// - `CreateDynamicRegion`: like `CreateDynamic`, but the resource id was
///   allocated out of a caller-specified region rather than the default one.
/// - `OpenDynamic`: this handle came from `open`/`open_by_address` against
///   an existing resource id; `close` decrements `num_opens` and, if that
///   reaches zero, auto-deletes the underlying gate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HandleKind {
    Local,
    CreateDynamic,
    CreateDynamicRegion,
    OpenDynamic,
}

/// A local handle to a gate this core has opened, opaque to callers.
///
/// Opening a gate (by name, through the name server, or by address) yields a
/// `GateHandle`; acquiring and releasing it are the only operations that
/// take one, so a handle from one core can never be accidentally used as if
/// it were a handle on another core's gate. `num_opens` mirrors the
/// registry's own open count at the moment this handle was produced --
/// freeing still goes through the registry by `(remote_kind, resource_id)`
/// rather than trusting this cached copy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GateHandle {
    pub remote_kind: RemoteProtectionKind,
    pub resource_id: u8,
    pub region_id: u16,
    pub cache_enabled: bool,
    pub num_opens: u32,
    pub kind: HandleKind,
}

impl GateHandle {
    pub fn new(
        remote_kind: RemoteProtectionKind,
        resource_id: u8,
        region_id: u16,
        cache_enabled: bool,
        num_opens: u32,
        kind: HandleKind,
    ) -> Self {
        Self {
            remote_kind,
            resource_id,
            region_id,
            cache_enabled,
            num_opens,
            kind,
        }
    }
}

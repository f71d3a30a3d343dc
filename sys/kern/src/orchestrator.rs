// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level operations, composed from the lower-level modules, that
//! `xproc-client` calls through.
//!
//! Nothing in this module holds its own state; it borrows the process-wide
//! [`KernelState`](crate::state::KernelState) for the duration of each
//! call. This is deliberately the thinnest possible layer over
//! `slot`/`region`/`gate_registry`/`restable` -- it exists so callers have
//! one place to read for "what does attaching actually do," rather than
//! needing to replicate the sequencing themselves.

use crate::gate_registry::DEFAULT_GATE_RESOURCE_ID;
use crate::restable::{self, PhysAllocator, ResourceTableConfig, ResourceTableResult};
use crate::state::with_kernel_state;
use crate::Trace;
use ringbuf::ringbuf_entry_root;
use xproc_abi::{
    CoreId, Error, RegionAttributes, RegionEntry, RemoteProtectionKind, StartedKey,
};

/// Registers the memory backing a companion core's resource table, patches
/// its carveouts, and returns the full map of memory/vring/trace/crashdump
/// entries the walk produced.
///
/// This must run before either side calls [`attach`], because the attach
/// handshake assumes every carveout the firmware declared is already
/// backed -- a firmware that reads an unpatched carveout entry (`pa == 0`)
/// before this step is a loader ordering bug, not a runtime fault to
/// recover from.
pub fn bootstrap_resource_table(
    table_bytes: &mut [u8],
    alloc: &mut impl PhysAllocator,
    config: ResourceTableConfig,
) -> Result<ResourceTableResult, Error> {
    let result = restable::process_table(table_bytes, alloc, config)?;
    ringbuf_entry_root!(Trace::ResourceTablePatched(result.patched_carveouts));
    Ok(result)
}

/// Registers a shared region so later [`xproc_abi::SharedPtr`] values can be
/// resolved against it.
pub fn register_region(id: u16, entry: RegionEntry) -> Result<(), Error> {
    with_kernel_state(|state| state.regions.register(id, entry))
}

/// A sub-protocol (notify, message transport) that needs its own setup and
/// teardown run as part of attach/detach.
///
/// Defined here rather than in `notify`/`transport` crates themselves so
/// this module doesn't need to depend on either -- each sub-protocol's own
/// crate implements this trait against its local state and the orchestrator
/// is handed a `&mut dyn SubProtocolAttach` only for the duration of one
/// call.
pub trait SubProtocolAttach {
    fn attach(&mut self, local: CoreId, remote: CoreId) -> Result<(), Error>;
    fn detach(&mut self, local: CoreId, remote: CoreId) -> Result<(), Error>;
}

/// Runs the attach handshake between `local` and `remote`.
///
/// The sequence is fixed: `procSyncStart`, the SR-0 owner's default gate
/// (created on first use, opened on every attach), the shared region-0
/// registration every peer needs before it can resolve a `SharedPtr`,
/// per-sub-protocol setup -- run only on the lower-`CoreId` side of the
/// pair, so two peers attaching to each other don't double-initialize a
/// transport meant to be set up once -- the caller's own attach callbacks,
/// and finally `procSyncFinish` followed by bumping the pair's attach
/// count. Tracing only fires once every step above has succeeded.
///
/// A pair that is already attached does not repeat any of this: the attach
/// count is bumped and [`Error::AlreadySetup`] is returned instead, so a
/// caller that retries an attach it already completed (or that races
/// another caller attaching the same pair) gets an unambiguous signal
/// rather than silently re-running setup twice.
pub fn attach(
    local: CoreId,
    remote: CoreId,
    mut notify: Option<&mut dyn SubProtocolAttach>,
    mut transport: Option<&mut dyn SubProtocolAttach>,
    attach_callbacks: &[fn(CoreId, CoreId)],
) -> Result<(), Error> {
    let already_attached = with_kernel_state(|state| -> Result<bool, Error> {
        if state.slots.is_attached(local, remote) {
            state.slots.increment_attach_count(local, remote)?;
            return Ok(true);
        }
        Ok(false)
    })?;
    if already_attached {
        return Err(Error::AlreadySetup);
    }

    with_kernel_state(|state| -> Result<(), Error> {
        state.slots.sync_start(local, remote)?;
        state.gates.ensure_default_gate(CoreId::HOST)?;
        state
            .gates
            .open_by_address(RemoteProtectionKind::SYSTEM, DEFAULT_GATE_RESOURCE_ID)?;
        if state.regions.get(0).is_err() {
            let _ = state.regions.register(
                0,
                RegionEntry::new(0, 0, RegionAttributes::READ | RegionAttributes::WRITE),
            );
        }
        Ok(())
    })?;

    // Sub-protocol setup (notify channel allocation, transport ring setup)
    // only runs on the lower-id side -- the higher-id side discovers what
    // the lower side set up rather than allocating its own copy.
    if local.0 < remote.0 {
        if let Some(notify) = notify.as_deref_mut() {
            notify.attach(local, remote)?;
        }
        if let Some(transport) = transport.as_deref_mut() {
            transport.attach(local, remote)?;
        }
    }

    for callback in attach_callbacks {
        callback(local, remote);
    }

    with_kernel_state(|state| -> Result<(), Error> {
        state.slots.sync_finish(local, remote)?;
        state.slots.increment_attach_count(local, remote)?;
        Ok(())
    })?;

    ringbuf_entry_root!(Trace::Attached(local, remote));
    Ok(())
}

/// Runs the detach sequence between `local` and `remote`.
///
/// Refuses with [`Error::NotReady`] if the peer is mid-attach (its side of
/// the handshake has reached `START` but not `FINISH`) -- detaching out
/// from under an in-progress attach would retire a slot the other side is
/// still trying to finish. Otherwise decrements the attach count; if other
/// attach references remain, returns `Ok(())` without tearing anything
/// down. Once the count reaches zero, the SR-0 owner refuses to detach
/// while any other peer remains attached to it ([`Error::OwnerDetachRefused`],
/// re-incrementing the count it just decremented so the pair's state is
/// unchanged by the refusal), since the resources a non-owner peer depends
/// on live behind the owner's attachment. Otherwise runs the caller's
/// detach callbacks, sub-protocol teardown (again only on the lower-id
/// side, mirroring attach), releases the default gate, and retires the
/// slot.
pub fn detach(
    local: CoreId,
    remote: CoreId,
    mut notify: Option<&mut dyn SubProtocolAttach>,
    mut transport: Option<&mut dyn SubProtocolAttach>,
    detach_callbacks: &[fn(CoreId, CoreId)],
) -> Result<(), Error> {
    with_kernel_state(|state| {
        if state.slots.state(local, remote) == StartedKey::START {
            Err(Error::NotReady)
        } else {
            Ok(())
        }
    })?;

    let remaining = with_kernel_state(|state| state.slots.decrement_attach_count(local, remote))?;
    if remaining > 0 {
        return Ok(());
    }

    if local == CoreId::HOST {
        let blocked = with_kernel_state(|state| state.slots.other_attached_peers(local, remote));
        if blocked {
            with_kernel_state(|state| state.slots.increment_attach_count(local, remote))?;
            return Err(Error::OwnerDetachRefused);
        }
    }

    for callback in detach_callbacks {
        callback(local, remote);
    }

    if local.0 < remote.0 {
        if let Some(transport) = transport.as_deref_mut() {
            transport.detach(local, remote)?;
        }
        if let Some(notify) = notify.as_deref_mut() {
            notify.detach(local, remote)?;
        }
    }

    with_kernel_state(|state| {
        let _ = state
            .gates
            .close_by_address(RemoteProtectionKind::SYSTEM, DEFAULT_GATE_RESOURCE_ID);
        state.slots.detach(local, remote)
    })?;

    ringbuf_entry_root!(Trace::Detached(local, remote));
    Ok(())
}

pub fn is_attached(local: CoreId, remote: CoreId) -> bool {
    with_kernel_state(|state| state.slots.is_attached(local, remote))
}

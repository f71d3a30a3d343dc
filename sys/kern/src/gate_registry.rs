// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gate registry: name-indexed lifecycle for cross-processor gates.
//!
//! Each [`RemoteProtectionKind`] owns its own resource-id space, represented
//! as a fixed-capacity in-use bitmap -- `system` resource 3 and `custom1`
//! resource 3 are unrelated gates, not a collision. A gate is created once
//! (`create`), can be opened by any number of additional callers that know
//! its name (`open`) or its raw `(kind, resource id)` address
//! (`open_by_address`), and is only actually freed once every opener has
//! called `close`/`delete` and the open count reaches zero.

use fixedmap::FixedMap;
use xproc_abi::{
    CoreId, Error, GateDescriptor, GateHandle, HandleKind, LocalProtectionKind,
    RemoteProtectionKind,
};

/// Whether one resource id in a kind's bitmap is free, live, or held back
/// from allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BitmapSlot {
    Unused,
    Used,
    /// Allocated outside the normal `create` path (currently only the SR-0
    /// owner's default gate at resource id 0) -- never handed out by the
    /// ordinary first-free-slot allocator.
    Reserved,
}

#[derive(Copy, Clone, Debug)]
struct GateRecord {
    descriptor: GateDescriptor,
    num_opens: u32,
}

/// Collaborator the gate registry publishes/looks up/unpublishes gate names
/// through. Defined here rather than in a separate `-api` crate because,
/// like `HwSpinlock`/`LocalProtection`/`MailboxHw`, no consumer needs this
/// trait without also depending on the rest of the kernel; the concrete
/// name table lives in `drv-xproc-nameserver`, which depends on this crate
/// (never the other way around) to implement it.
pub trait NamePublisher {
    fn publish(&mut self, name: [u8; 16], descriptor: GateDescriptor);
    fn lookup(&self, name: &[u8; 16]) -> Option<GateDescriptor>;
    fn unpublish(&mut self, name: &[u8; 16]);
}

/// Resource id of the SR-0 owner's always-present default gate.
pub const DEFAULT_GATE_RESOURCE_ID: u8 = 0;

pub struct GateRegistry<const N: usize> {
    system: [BitmapSlot; N],
    custom1: [BitmapSlot; N],
    custom2: [BitmapSlot; N],
    system_records: FixedMap<u8, GateRecord, N>,
    custom1_records: FixedMap<u8, GateRecord, N>,
    custom2_records: FixedMap<u8, GateRecord, N>,
}

impl<const N: usize> Default for GateRegistry<N> {
    fn default() -> Self {
        let mut system = [BitmapSlot::Unused; N];
        if N > 0 {
            system[DEFAULT_GATE_RESOURCE_ID as usize] = BitmapSlot::Reserved;
        }
        Self {
            system,
            custom1: [BitmapSlot::Unused; N],
            custom2: [BitmapSlot::Unused; N],
            system_records: FixedMap::default(),
            custom1_records: FixedMap::default(),
            custom2_records: FixedMap::default(),
        }
    }
}

impl<const N: usize> GateRegistry<N> {
    fn bitmap_mut(&mut self, kind: RemoteProtectionKind) -> &mut [BitmapSlot; N] {
        if kind == RemoteProtectionKind::SYSTEM {
            &mut self.system
        } else if kind == RemoteProtectionKind::CUSTOM1 {
            &mut self.custom1
        } else {
            &mut self.custom2
        }
    }

    fn bitmap(&self, kind: RemoteProtectionKind) -> &[BitmapSlot; N] {
        if kind == RemoteProtectionKind::SYSTEM {
            &self.system
        } else if kind == RemoteProtectionKind::CUSTOM1 {
            &self.custom1
        } else {
            &self.custom2
        }
    }

    fn records_mut(&mut self, kind: RemoteProtectionKind) -> &mut FixedMap<u8, GateRecord, N> {
        if kind == RemoteProtectionKind::SYSTEM {
            &mut self.system_records
        } else if kind == RemoteProtectionKind::CUSTOM1 {
            &mut self.custom1_records
        } else {
            &mut self.custom2_records
        }
    }

    fn records(&self, kind: RemoteProtectionKind) -> &FixedMap<u8, GateRecord, N> {
        if kind == RemoteProtectionKind::SYSTEM {
            &self.system_records
        } else if kind == RemoteProtectionKind::CUSTOM1 {
            &self.custom1_records
        } else {
            &self.custom2_records
        }
    }

    /// Whether resource id `p` under `kind`'s bitmap is currently in use --
    /// true exactly when some live handle's resource id is `p`, the
    /// testable invariant this bitmap exists to support.
    pub fn is_in_use(&self, kind: RemoteProtectionKind, resource_id: u8) -> bool {
        matches!(
            self.bitmap(kind).get(resource_id as usize),
            Some(BitmapSlot::Used)
        )
    }

    fn alloc_resource_id(&mut self, kind: RemoteProtectionKind) -> Result<u8, Error> {
        let bitmap = self.bitmap_mut(kind);
        let idx = bitmap
            .iter()
            .position(|s| *s == BitmapSlot::Unused)
            .ok_or(Error::GateUnavailable)?;
        bitmap[idx] = BitmapSlot::Used;
        Ok(idx as u8)
    }

    /// Creates a fresh gate under `remote_kind`, optionally publishing it
    /// under `name` so other cores can `open` it later.
    pub fn create(
        &mut self,
        remote_kind: RemoteProtectionKind,
        local_kind: LocalProtectionKind,
        owner: CoreId,
        name: Option<[u8; 16]>,
        publisher: &mut impl NamePublisher,
    ) -> Result<GateHandle, Error> {
        let resource_id = self.alloc_resource_id(remote_kind)?;
        let descriptor = GateDescriptor::new(resource_id, remote_kind, local_kind, owner);
        self.records_mut(remote_kind).insert(
            resource_id,
            GateRecord {
                descriptor,
                num_opens: 1,
            },
        );
        if let Some(name) = name {
            publisher.publish(name, descriptor);
        }
        Ok(GateHandle::new(
            remote_kind,
            resource_id,
            0,
            false,
            1,
            HandleKind::CreateDynamic,
        ))
    }

    /// Opens a gate published under `name`, regardless of which core
    /// created it. The handle's `remote_kind`/`resource_id` reflect the
    /// gate's actual registered kind, not whatever kind the caller expected
    /// -- a caller that only knows a weaker alias still gets a correct
    /// handle back.
    pub fn open(
        &mut self,
        name: &[u8; 16],
        publisher: &impl NamePublisher,
    ) -> Result<GateHandle, Error> {
        let descriptor = publisher.lookup(name).ok_or(Error::InvalidGateHandle)?;
        self.open_by_address(descriptor.remote_kind, descriptor.hw_lock_index)
    }

    /// Opens a gate directly by its `(kind, resource id)` address, bypassing
    /// the name server -- used by the orchestrator to reconstruct the SR-0
    /// owner's default gate, and usable generally when the caller already
    /// knows the address out of band.
    pub fn open_by_address(
        &mut self,
        remote_kind: RemoteProtectionKind,
        resource_id: u8,
    ) -> Result<GateHandle, Error> {
        let records = self.records_mut(remote_kind);
        let mut record = records.get(resource_id).ok_or(Error::InvalidGateHandle)?;
        record.num_opens += 1;
        records.insert(resource_id, record);
        Ok(GateHandle::new(
            remote_kind,
            resource_id,
            0,
            false,
            record.num_opens,
            HandleKind::OpenDynamic,
        ))
    }

    /// Idempotently ensures the SR-0 owner's default gate exists at resource
    /// id 0 under `RemoteProtectionKind::SYSTEM`, creating it on first call
    /// and simply opening it (bumping the open count) on later calls.
    pub fn ensure_default_gate(&mut self, owner: CoreId) -> Result<GateHandle, Error> {
        if self.system_records.get(DEFAULT_GATE_RESOURCE_ID).is_some() {
            return self.open_by_address(RemoteProtectionKind::SYSTEM, DEFAULT_GATE_RESOURCE_ID);
        }
        self.system[DEFAULT_GATE_RESOURCE_ID as usize] = BitmapSlot::Used;
        let descriptor = GateDescriptor::new(
            DEFAULT_GATE_RESOURCE_ID,
            RemoteProtectionKind::SYSTEM,
            LocalProtectionKind::NONE,
            owner,
        );
        self.system_records.insert(
            DEFAULT_GATE_RESOURCE_ID,
            GateRecord {
                descriptor,
                num_opens: 1,
            },
        );
        Ok(GateHandle::new(
            RemoteProtectionKind::SYSTEM,
            DEFAULT_GATE_RESOURCE_ID,
            0,
            false,
            1,
            HandleKind::Local,
        ))
    }

    /// Releases one open reference. If this was the last one, the gate is
    /// freed: its resource id returns to `Unused` (never back to
    /// `Reserved`, even for the default gate) and its record is dropped.
    pub fn close(&mut self, remote_kind: RemoteProtectionKind, resource_id: u8) -> Result<(), Error> {
        self.close_by_address(remote_kind, resource_id)
    }

    pub fn close_by_address(
        &mut self,
        remote_kind: RemoteProtectionKind,
        resource_id: u8,
    ) -> Result<(), Error> {
        let records = self.records_mut(remote_kind);
        let mut record = records.get(resource_id).ok_or(Error::InvalidGateHandle)?;
        record.num_opens = record.num_opens.saturating_sub(1);
        if record.num_opens == 0 {
            records.remove(resource_id);
            self.bitmap_mut(remote_kind)[resource_id as usize] = BitmapSlot::Unused;
        } else {
            records.insert(resource_id, record);
        }
        Ok(())
    }

    /// Deletes a gate created with `create`. Requires `num_opens == 0` --
    /// every other opener must have already called `close`.
    pub fn delete(&mut self, remote_kind: RemoteProtectionKind, resource_id: u8) -> Result<(), Error> {
        let records = self.records_mut(remote_kind);
        let record = records.get(resource_id).ok_or(Error::InvalidGateHandle)?;
        if record.num_opens != 0 {
            return Err(Error::GateStillOpen);
        }
        records.remove(resource_id);
        self.bitmap_mut(remote_kind)[resource_id as usize] = BitmapSlot::Unused;
        Ok(())
    }

    /// Looks up the live descriptor behind a handle, for `gate::acquire`.
    pub fn descriptor(&self, handle: &GateHandle) -> Result<GateDescriptor, Error> {
        self.records(handle.remote_kind)
            .get(handle.resource_id)
            .map(|r| r.descriptor)
            .ok_or(Error::InvalidGateHandle)
    }
}

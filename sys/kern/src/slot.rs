// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attach/detach handshake: reserved-slot state machine.
//!
//! Two cores attach by each calling [`SlotTable::sync_start`] and then
//! [`SlotTable::sync_finish`] against the same reserved slot. Either call
//! may arrive first; the slot only needs to see both calls once each before
//! it's considered `FINISH`ed (attached). This mirrors the two-sided
//! rendezvous real companion-core firmware performs during boot, where
//! neither side can assume which one starts executing first.

use xproc_abi::{CoreId, Error, ReservedSlot, StartedKey};

/// Table of reserved slots, one per ordered `(local, remote)` pair that has
/// ever attempted to attach.
///
/// Slots are allocated on first touch and never reused -- see
/// [`StartedKey`]'s doc comment for why a crashed peer can't reuse a stale
/// slot.
pub struct SlotTable<const N: usize> {
    slots: [Option<ReservedSlot>; N],
}

impl<const N: usize> Default for SlotTable<N> {
    fn default() -> Self {
        Self { slots: [None; N] }
    }
}

impl<const N: usize> SlotTable<N> {
    /// Finds the most recent slot for `(local, remote)`, if any -- the
    /// highest-index match, since slots are appended in order and never
    /// compacted, so a pair that has attached more than once has its
    /// current slot at the latest index.
    fn find(&self, local: CoreId, remote: CoreId) -> Option<usize> {
        self.slots
            .iter()
            .rposition(|s| matches!(s, Some(s) if s.matches(local.0, remote.0)))
    }

    fn find_or_reserve(&mut self, local: CoreId, remote: CoreId) -> Result<usize, Error> {
        if let Some(idx) = self.find(local, remote) {
            if self.slots[idx].unwrap().state != StartedKey::DETACH {
                return Ok(idx);
            }
        }
        let idx = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::GateRegistryFull)?;
        self.slots[idx] = Some(ReservedSlot::new(local.0, remote.0));
        Ok(idx)
    }

    /// `procSyncStart`: advances this side's view of the handshake from
    /// `UNINIT` to `START`. Idempotent if this side has already called it --
    /// a peer retrying after a lost notification sees the same state rather
    /// than an error.
    pub fn sync_start(&mut self, local: CoreId, remote: CoreId) -> Result<StartedKey, Error> {
        let idx = self.find_or_reserve(local, remote)?;
        let slot = self.slots[idx].as_mut().unwrap();
        if slot.state == StartedKey::UNINIT {
            slot.state = StartedKey::START;
        }
        Ok(slot.state)
    }

    /// `procSyncFinish`: advances from `START` to `FINISH`. Requires that
    /// `sync_start` has already been observed for this pair (by either
    /// side's call reaching `find_or_reserve` first); calling it on an
    /// `UNINIT` slot is a protocol error.
    pub fn sync_finish(&mut self, local: CoreId, remote: CoreId) -> Result<StartedKey, Error> {
        let idx = self.find(local, remote).ok_or(Error::BadSlotState)?;
        let slot = self.slots[idx].as_mut().unwrap();
        match slot.state {
            StartedKey::START => {
                slot.state = StartedKey::FINISH;
                Ok(slot.state)
            }
            StartedKey::FINISH => Ok(slot.state),
            _ => Err(Error::BadSlotState),
        }
    }

    /// Retires the slot, moving it to `DETACH`. A subsequent attach between
    /// the same pair allocates a fresh slot rather than reusing this index.
    pub fn detach(&mut self, local: CoreId, remote: CoreId) -> Result<(), Error> {
        let idx = self.find(local, remote).ok_or(Error::NotAttached)?;
        let slot = self.slots[idx].as_mut().unwrap();
        slot.state = slot.detach().ok_or(Error::NotAttached)?;
        Ok(())
    }

    pub fn state(&self, local: CoreId, remote: CoreId) -> StartedKey {
        self.find(local, remote)
            .and_then(|idx| self.slots[idx].map(|s| s.state))
            .unwrap_or(StartedKey::UNINIT)
    }

    pub fn is_attached(&self, local: CoreId, remote: CoreId) -> bool {
        self.state(local, remote).is_attached()
    }

    /// Direct access to a pair's reserved slot, for the orchestrator and
    /// config channel to read/write the sub-protocol pointers and config
    /// list head that live alongside the handshake state.
    pub fn slot_mut(&mut self, local: CoreId, remote: CoreId) -> Result<&mut ReservedSlot, Error> {
        let idx = self.find(local, remote).ok_or(Error::NotAttached)?;
        Ok(self.slots[idx].as_mut().unwrap())
    }

    pub fn slot(&self, local: CoreId, remote: CoreId) -> Result<&ReservedSlot, Error> {
        let idx = self.find(local, remote).ok_or(Error::NotAttached)?;
        Ok(self.slots[idx].as_ref().unwrap())
    }

    pub fn attach_count(&self, local: CoreId, remote: CoreId) -> u32 {
        self.slot(local, remote).map(|s| s.attach_count).unwrap_or(0)
    }

    pub fn increment_attach_count(&mut self, local: CoreId, remote: CoreId) -> Result<u32, Error> {
        let slot = self.slot_mut(local, remote)?;
        slot.attach_count += 1;
        Ok(slot.attach_count)
    }

    /// Decrements the attach count, saturating at zero rather than
    /// underflowing -- a detach racing an already-zero count is a caller
    /// bug, not something this table should panic over.
    pub fn decrement_attach_count(&mut self, local: CoreId, remote: CoreId) -> Result<u32, Error> {
        let slot = self.slot_mut(local, remote)?;
        slot.attach_count = slot.attach_count.saturating_sub(1);
        Ok(slot.attach_count)
    }

    /// Whether `local` is still attached to any peer other than `excluding`.
    ///
    /// Used to enforce the rule that the SR-0 owner may not detach from a
    /// peer while other peers remain attached to it.
    pub fn other_attached_peers(&self, local: CoreId, excluding: CoreId) -> bool {
        self.slots.iter().flatten().any(|s| {
            s.local == local.0 && s.remote != excluding.0 && s.state.is_attached()
        })
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-processor gate: a distributed mutex combining a hardware spinlock
//! (cross-core exclusion) with a local protection mechanism (intra-core
//! exclusion).
//!
//! Acquiring a gate always does the local half first: if another context on
//! *this* core could preempt us mid-critical-section, we need that excluded
//! before we go spin on hardware another core might be spinning on too,
//! otherwise we could hold the hardware lock while a higher-priority local
//! context blocks forever waiting for us to yield it back to them, and we
//! never do because we're waiting on them.

use xproc_abi::{Error, GateDescriptor, LocalProtectionKind};

/// Platform hook for the hardware spinlock bank.
///
/// `try_lock` must be non-blocking: gate acquisition provides its own
/// spin/backoff policy above this trait so platform code never needs to.
pub trait HwSpinlock {
    fn try_lock(&self, index: u8) -> bool;
    fn unlock(&self, index: u8);
}

/// Platform hook for the local protection mechanism named by a gate's
/// [`LocalProtectionKind`].
///
/// `enter`/`exit` must nest correctly for `Interrupt` and `ThreadProcess`
/// (disable/restore a saved state), and `Tasklet` excludes only the mailbox
/// dispatcher's task-level half, not interrupts.
pub trait LocalProtection {
    type Token;
    fn enter(&self, kind: LocalProtectionKind) -> Self::Token;
    fn exit(&self, kind: LocalProtectionKind, token: Self::Token);
}

/// An acquired gate. Dropping this releases both halves, local first then
/// hardware -- the reverse of acquisition order, so the hardware lock is
/// never held without the local exclusion that was supposed to back it.
pub struct GateGuard<'a, H: HwSpinlock, L: LocalProtection> {
    hw: &'a H,
    local: &'a L,
    descriptor: GateDescriptor,
    token: Option<L::Token>,
}

impl<'a, H: HwSpinlock, L: LocalProtection> GateGuard<'a, H, L> {
    pub fn descriptor(&self) -> GateDescriptor {
        self.descriptor
    }
}

impl<'a, H: HwSpinlock, L: LocalProtection> Drop for GateGuard<'a, H, L> {
    fn drop(&mut self) {
        self.hw.unlock(self.descriptor.hw_lock_index);
        if let Some(token) = self.token.take() {
            self.local.exit(self.descriptor.local_kind, token);
        }
    }
}

/// Acquires `descriptor`'s gate, spinning on the hardware half up to
/// `max_spins` times before giving up.
///
/// A bounded spin count rather than an unbounded loop matches how the rest
/// of this substrate treats liveness: a peer that dies holding a gate is a
/// fault to be reported, not something to hang waiting on.
pub fn acquire<'a, H: HwSpinlock, L: LocalProtection>(
    hw: &'a H,
    local: &'a L,
    descriptor: GateDescriptor,
    max_spins: u32,
) -> Result<GateGuard<'a, H, L>, Error> {
    let token = local.enter(descriptor.local_kind);

    let mut spins = 0;
    loop {
        if hw.try_lock(descriptor.hw_lock_index) {
            return Ok(GateGuard {
                hw,
                local,
                descriptor,
                token: Some(token),
            });
        }
        spins += 1;
        if spins >= max_spins {
            local.exit(descriptor.local_kind, token);
            return Err(Error::GateAlreadyHeld);
        }
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use xproc_abi::{CoreId, RemoteProtectionKind};

    struct FakeHw {
        locked: Cell<bool>,
        fail_n_times: Cell<u32>,
    }

    impl HwSpinlock for FakeHw {
        fn try_lock(&self, _index: u8) -> bool {
            if self.fail_n_times.get() > 0 {
                self.fail_n_times.set(self.fail_n_times.get() - 1);
                return false;
            }
            if self.locked.get() {
                false
            } else {
                self.locked.set(true);
                true
            }
        }
        fn unlock(&self, _index: u8) {
            self.locked.set(false);
        }
    }

    struct FakeLocal {
        entries: Cell<u32>,
    }

    impl LocalProtection for FakeLocal {
        type Token = ();
        fn enter(&self, _kind: LocalProtectionKind) -> Self::Token {
            self.entries.set(self.entries.get() + 1);
        }
        fn exit(&self, _kind: LocalProtectionKind, _token: Self::Token) {
            self.entries.set(self.entries.get() - 1);
        }
    }

    fn descriptor() -> GateDescriptor {
        GateDescriptor::new(
            0,
            RemoteProtectionKind::SYSTEM,
            LocalProtectionKind::THREAD_PROCESS,
            CoreId::HOST,
        )
    }

    #[test]
    fn acquire_and_drop_releases_both_halves() {
        let hw = FakeHw {
            locked: Cell::new(false),
            fail_n_times: Cell::new(0),
        };
        let local = FakeLocal { entries: Cell::new(0) };

        {
            let _guard = acquire(&hw, &local, descriptor(), 10).unwrap();
            assert!(hw.locked.get());
            assert_eq!(local.entries.get(), 1);
        }
        assert!(!hw.locked.get());
        assert_eq!(local.entries.get(), 0);
    }

    #[test]
    fn spin_exhaustion_releases_local_and_errors() {
        let hw = FakeHw {
            locked: Cell::new(true),
            fail_n_times: Cell::new(0),
        };
        let local = FakeLocal { entries: Cell::new(0) };

        let result = acquire(&hw, &local, descriptor(), 5);
        assert_eq!(result.err(), Some(Error::GateAlreadyHeld));
        assert_eq!(local.entries.get(), 0);
    }

    #[test]
    fn acquire_retries_through_transient_contention() {
        let hw = FakeHw {
            locked: Cell::new(false),
            fail_n_times: Cell::new(3),
        };
        let local = FakeLocal { entries: Cell::new(0) };

        let guard = acquire(&hw, &local, descriptor(), 10).unwrap();
        assert!(hw.locked.get());
        drop(guard);
    }
}

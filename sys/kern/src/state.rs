// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide kernel state.
//!
//! Everything the substrate needs to track locally (as opposed to what
//! lives in shared memory) is gathered into one [`KernelState`] behind a
//! single `spin::Mutex`. A single lock rather than one per table keeps the
//! locking story simple: every operation here is short (array scans over
//! small fixed-capacity tables), so there is no meaningful contention cost
//! to coarsening the lock, and it rules out lock-ordering bugs between the
//! slot table and the gate registry by construction.

use crate::gate_registry::GateRegistry;
use crate::mailbox::Dispatcher;
use crate::region::RegionTable;
use crate::slot::SlotTable;
use spin::Mutex;
use xproc_abi::{MAX_CORES, MAX_NAMED_OBJECTS};

const REGION_TABLE_SIZE: usize = 32;
const MAILBOX_QUEUE_SIZE: usize = 32;

#[derive(Default)]
pub struct KernelState {
    pub regions: RegionTable<REGION_TABLE_SIZE>,
    pub slots: SlotTable<MAX_CORES>,
    pub gates: GateRegistry<MAX_NAMED_OBJECTS>,
    pub mailbox: Dispatcher<MAILBOX_QUEUE_SIZE, MAX_CORES>,
}

/// The single process-wide instance, lazily populated on first use.
///
/// `Default::default()` can't run in a `static` initializer, so this holds
/// `None` until [`with_kernel_state`] first touches it: a lock guarding an
/// `Option` that's populated on first use instead of a `const fn`
/// constructor threaded through every nested fixed-capacity collection.
static KERNEL: Mutex<Option<KernelState>> = Mutex::new(None);

/// Runs `f` against the process-wide kernel state, initializing it on the
/// first call.
pub fn with_kernel_state<R>(f: impl FnOnce(&mut KernelState) -> R) -> R {
    let mut guard = KERNEL.lock();
    let state = guard.get_or_insert_with(KernelState::default);
    f(state)
}

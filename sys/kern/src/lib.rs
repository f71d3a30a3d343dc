// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-processor IPC substrate kernel.
//!
//! This is the application-independent logic shared by every participant
//! in the substrate: the attach/detach handshake, the cross-processor gate,
//! the mailbox dispatcher, the resource table processor, and the config
//! exchange channel. It does not know whether it's linked into a host-side
//! daemon or a companion core's firmware image -- that's why everything
//! hardware-specific (spinlock instructions, cache maintenance, mailbox
//! FIFO access) is expressed as a trait here and supplied by the platform
//! glue in `drv/`.
//!
//! # Design principles
//!
//! 1. No allocator. Every table is fixed-capacity, sized generously enough
//!    for any topology this crate expects to run ([`xproc_abi::MAX_CORES`]
//!    companion cores).
//! 2. One lock. All local state lives behind a single mutex
//!    ([`state::KERNEL`](state)) rather than one per subsystem, because
//!    every operation here is short and uncontended locking isn't worth
//!    the bug surface of fine-grained lock ordering.
//! 3. Bounded everything. Spin loops, chain walks, and queues all have an
//!    explicit bound and fail with a specific [`xproc_abi::Error`] instead
//!    of looping or growing forever.

#![cfg_attr(not(test), no_std)]

pub mod cache;
pub mod config_channel;
pub mod gate;
pub mod gate_registry;
pub mod mailbox;
pub mod orchestrator;
pub mod region;
pub mod restable;
pub mod slot;
pub mod state;

pub use xproc_abi::Error;

/// Diagnostic trace recorded for every substrate operation that changes
/// durable local state. Surfaced through the same ring-buffer mechanism
/// the rest of this tree uses for in-field debugging (inspectable via
/// Humility or GDB once linked into a firmware image).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    None,
    Attached(xproc_abi::CoreId, xproc_abi::CoreId),
    Detached(xproc_abi::CoreId, xproc_abi::CoreId),
    ResourceTablePatched(u32),
}

ringbuf::ringbuf!(Trace, 64, Trace::None);

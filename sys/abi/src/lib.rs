// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire types and shared vocabulary for the cross-processor IPC substrate.
//!
//! This crate defines the on-the-wire layout of everything that crosses the
//! host/companion-core boundary through shared physical memory: resource
//! table entries, gate descriptors, reserved-slot handshake state, and
//! config-channel blobs. Everything here is `#[repr(C)]` and derives
//! `zerocopy`'s traits so it can be read directly out of (and written
//! directly into) shared memory without a serialization pass.
//!
//! None of these types know how memory is mapped or who owns a lock; they
//! are pure data. The logic that interprets them lives in `xproc-kern`.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

mod config;
mod core_id;
mod error;
mod gate;
mod region;
mod restable;
mod shared_ptr;
mod slot;

pub use config::{ConfigEntryHeader, ConfigKind, CONFIG_LIST_END};
pub use core_id::CoreId;
pub use error::Error;
pub use gate::{
    GateDescriptor, GateHandle, GateStatus, HandleKind, LocalProtectionKind, ObjectKind,
    RemoteProtectionKind,
};
pub use region::{RegionAttributes, RegionEntry};
pub use restable::{
    CarveoutEntry, CrashdumpEntry, DevmemEntry, MemoryEntry, ResourceEntryKind,
    ResourceTableHeader, TraceEntry, VdevEntry, VringInfo, VringsDescriptor, RSC_TABLE_VERSION,
};
pub use shared_ptr::SharedPtr;
pub use slot::{ReservedSlot, StartedKey};

/// Maximum number of companion cores a single host can be attached to.
///
/// This bounds every fixed-size table in the kernel (gate registries, name
/// server slots, reserved-slot arrays) so none of them need a heap.
pub const MAX_CORES: usize = 16;

/// Maximum number of named objects (gates, queues) a single core can
/// publish through the name server.
pub const MAX_NAMED_OBJECTS: usize = 32;

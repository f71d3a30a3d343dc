// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trait for putting a companion core into and out of reset.
//!
//! Bootstrapping a resource table and attaching to a remote peer both
//! assume the remote core isn't running yet: it has to be held in reset
//! while the host patches carveout addresses into its image, then released
//! once the table is ready. This is a separate concern from the mailbox and
//! gate hardware, so it gets its own trait and its own `-api` crate the way
//! the rest of `drv/` does.

use xproc_abi::{CoreId, Error};

/// Resets, releases, and halts a single companion core.
pub trait ProcessorControl {
    /// Asserts reset for `core`, stopping any code it is currently running.
    fn hold_in_reset(&mut self, core: CoreId) -> Result<(), Error>;

    /// Deasserts reset for `core`, letting it begin executing from its
    /// entry point.
    fn release_from_reset(&mut self, core: CoreId) -> Result<(), Error>;

    /// True if `core` is currently held in reset.
    fn is_in_reset(&self, core: CoreId) -> bool;
}

/// A [`ProcessorControl`] that only tracks reset state in memory, for use
/// in tests and host-side simulation where no real companion core exists.
#[derive(Default)]
pub struct NullProcessorControl {
    held: heapless::FnvIndexMap<u8, bool, 16>,
}

impl ProcessorControl for NullProcessorControl {
    fn hold_in_reset(&mut self, core: CoreId) -> Result<(), Error> {
        self.held
            .insert(core.0, true)
            .map(|_| ())
            .map_err(|_| Error::OutOfBounds)
    }

    fn release_from_reset(&mut self, core: CoreId) -> Result<(), Error> {
        self.held
            .insert(core.0, false)
            .map(|_| ())
            .map_err(|_| Error::OutOfBounds)
    }

    fn is_in_reset(&self, core: CoreId) -> bool {
        self.held.get(&core.0).copied().unwrap_or(true)
    }
}

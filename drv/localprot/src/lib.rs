// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg_attr(not(test), no_std)]

//! Interrupt-disable-based [`LocalProtection`] for a companion core with no
//! task scheduler of its own.
//!
//! `LocalProtectionKind` distinguishes `Interrupt`, `Tasklet`, and
//! `ThreadProcess` exclusion because the host side of this substrate (a
//! multi-threaded daemon) genuinely needs to tell them apart. A bare-metal
//! companion core that boots straight into a single loop with no RTOS does
//! not: the only thing that can ever preempt it is an interrupt, so all
//! three kinds collapse to the same critical section here. A future
//! companion-core target that does run tasks would need its own
//! `LocalProtection` implementation that tells `Tasklet`/`ThreadProcess`
//! apart from `Interrupt`.

use critical_section::RestoreState;
use xproc_abi::LocalProtectionKind;
use xproc_kern::gate::LocalProtection;

/// A [`LocalProtection`] backed by the global `critical-section` crate.
///
/// This type is a marker; the actual exclusion state lives in whatever
/// target-specific `critical-section` implementation is linked in (via
/// `critical_section::set_impl!` on real hardware, or the `std` feature's
/// mutex-backed implementation in tests).
#[derive(Default)]
pub struct CriticalSectionLocal;

impl LocalProtection for CriticalSectionLocal {
    type Token = RestoreState;

    fn enter(&self, _kind: LocalProtectionKind) -> Self::Token {
        unsafe { critical_section::acquire() }
    }

    fn exit(&self, _kind: LocalProtectionKind, token: Self::Token) {
        unsafe { critical_section::release(token) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_then_exit_does_not_panic() {
        let local = CriticalSectionLocal;
        let token = local.enter(LocalProtectionKind::INTERRUPT);
        local.exit(LocalProtectionKind::INTERRUPT, token);
    }

    #[test]
    fn all_kinds_share_the_same_critical_section() {
        let local = CriticalSectionLocal;
        for kind in [
            LocalProtectionKind::NONE,
            LocalProtectionKind::INTERRUPT,
            LocalProtectionKind::TASKLET,
            LocalProtectionKind::THREAD_PROCESS,
        ] {
            let token = local.enter(kind);
            local.exit(kind, token);
        }
    }
}

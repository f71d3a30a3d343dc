// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Receive-and-dispatch loop.
//!
//! Adapted from this tree's `hl::recv` pattern: a single call drains
//! whatever mailbox events are pending for a fixed set of peers and hands
//! each one to a listener callback, rather than asking the caller to poll
//! the dispatcher's internal queue directly. Unlike `hl::recv`, which
//! blocks on a kernel notification, this has no OS wait primitive to block
//! on -- callers needing to block until something arrives wrap this in
//! their own poll loop (with a sleep, a `select!`, whatever fits their
//! runtime) at the call site, since that choice depends on whether the
//! embedding process is async, threaded, or something else entirely.

use xproc_abi::{CoreId, Error};
use xproc_kern::mailbox::{Event, Listener as KernListener, MailboxHw};
use xproc_kern::state::with_kernel_state;

/// Callback invoked once per dispatched [`Event`].
///
/// A plain trait (rather than requiring `FnMut`) so implementors can carry
/// state across calls without capturing it in a closure -- the common case
/// being "remember the last config value seen from each peer."
pub trait Listener {
    fn on_event(&mut self, event: Event);
}

struct Adapter<'a, T: Listener>(&'a mut T);

impl<'a, T: Listener> KernListener for Adapter<'a, T> {
    fn on_event(&mut self, event: Event) {
        self.0.on_event(event);
    }
}

/// Drains every pending mailbox event for `peers` and dispatches it to
/// `listener`, returning how many events were delivered.
///
/// Call this from whatever the embedding process uses as its event loop
/// tick; it does not block.
pub fn recv(hw: &impl MailboxHw, peers: &[CoreId], listener: &mut impl Listener) -> u32 {
    with_kernel_state(|state| {
        // A queue-full error here means events were dropped on the floor
        // before dispatch got a chance to run; we still deliver whatever
        // made it into the queue rather than discarding those too.
        let _ = state.mailbox.on_interrupt(hw, peers);
        let mut adapter = Adapter(listener);
        state.mailbox.poll(&mut adapter)
    })
}

/// Registers interest in `peer`'s mailbox events under `interrupt_id`,
/// required before [`recv`] will deliver any for it. Returns
/// [`Error::ListenerAlreadyRegistered`] if this peer is already registered
/// with a different (or the same) interrupt id -- callers that want the
/// refcounted re-register behavior should match on that error rather than
/// treating it as fatal.
pub fn register(peer: CoreId, interrupt_id: u32) -> Result<(), Error> {
    with_kernel_state(|state| state.mailbox.register(peer, interrupt_id))
}

pub fn unregister(peer: CoreId) {
    with_kernel_state(|state| state.mailbox.unregister(peer));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakeHw {
        queued: RefCell<std::collections::VecDeque<u32>>,
    }

    impl MailboxHw for FakeHw {
        fn drain_one(&self, _peer: CoreId) -> Option<u32> {
            self.queued.borrow_mut().pop_front()
        }
        fn send(&self, _peer: CoreId, _payload: u32) {}
    }

    #[derive(Default)]
    struct Collector(Vec<Event>);
    impl Listener for Collector {
        fn on_event(&mut self, event: Event) {
            self.0.push(event);
        }
    }

    #[test]
    fn recv_dispatches_registered_peer_events() {
        let peer = CoreId(5);
        register(peer, 5).unwrap();
        let hw = FakeHw {
            queued: RefCell::new(std::collections::VecDeque::from([1, 2, 3])),
        };
        let mut collector = Collector::default();
        let delivered = recv(&hw, &[peer], &mut collector);
        assert_eq!(delivered, 3);
        assert_eq!(collector.0.len(), 3);
        unregister(peer);
    }
}

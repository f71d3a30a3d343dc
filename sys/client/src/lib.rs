// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ergonomic host-side client for the cross-processor IPC substrate.
//!
//! `xproc-kern` is deliberately low-level: bare `Result<T, xproc_abi::Error>`
//! returns, no logging, no environment awareness. This crate wraps it with
//! the conveniences a host-side application actually wants: `anyhow`
//! context on errors, environment-driven topology configuration, and a
//! `recv`-and-dispatch loop in the shape `hl::recv` uses in the rest of
//! this tree, adapted from "wait for a kernel notification" to "wait for
//! mailbox events across every attached peer."

mod dispatch;
mod env;

pub use dispatch::{recv, Listener};
pub use env::ClientConfig;
pub use xproc_abi::{CoreId, Error};

use anyhow::Context;
use xproc_abi::RegionEntry;

/// A handle to one attached peer, returned by [`XprocClient::attach`].
///
/// Dropping this does *not* detach -- detach is an explicit, fallible
/// operation (the peer might be mid-transfer), so it isn't something we
/// want happening implicitly on panic unwind.
#[derive(Copy, Clone, Debug)]
pub struct Peer {
    pub local: CoreId,
    pub remote: CoreId,
}

/// Entry point for host-side code driving the substrate.
///
/// This is a zero-sized handle; all state actually lives behind
/// `xproc_kern::state::KERNEL`. It exists so call sites read as operations
/// on "the client" rather than free functions, matching how this tree's
/// task-side APIs are usually expressed as methods on a small client type.
#[derive(Copy, Clone, Debug, Default)]
pub struct XprocClient {
    pub local: CoreId,
}

impl XprocClient {
    pub fn new(local: CoreId) -> Self {
        Self { local }
    }

    /// Builds a client for the host, using [`ClientConfig::from_env`] to
    /// discover topology overrides from `XPROC_PARAMS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::from_env()?;
        Ok(Self::new(config.local))
    }

    /// Registers the physical backing for a shared region so later
    /// operations can resolve `SharedPtr`s against it.
    pub fn register_region(&self, id: u16, entry: RegionEntry) -> anyhow::Result<()> {
        xproc_kern::orchestrator::register_region(id, entry)
            .with_context(|| format!("registering shared region {id}"))
    }

    /// Runs the attach handshake with `remote`, returning a [`Peer`] handle
    /// on success.
    pub fn attach(&self, remote: CoreId) -> anyhow::Result<Peer> {
        xproc_kern::orchestrator::attach(self.local, remote, None, None, &[])
            .with_context(|| format!("attaching to {remote}"))?;
        Ok(Peer {
            local: self.local,
            remote,
        })
    }

    pub fn detach(&self, peer: Peer) -> anyhow::Result<()> {
        xproc_kern::orchestrator::detach(peer.local, peer.remote, None, None, &[])
            .with_context(|| format!("detaching from {}", peer.remote))
    }

    pub fn is_attached(&self, remote: CoreId) -> bool {
        xproc_kern::orchestrator::is_attached(self.local, remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_detach_through_the_client() {
        let client = XprocClient::new(CoreId::HOST);
        let peer = client.attach(CoreId(9)).unwrap();
        assert!(client.is_attached(CoreId(9)));
        client.detach(peer).unwrap();
        assert!(!client.is_attached(CoreId(9)));
    }
}

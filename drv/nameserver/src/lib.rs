// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![cfg_attr(not(test), no_std)]

//! Cross-core name server: maps a short name to a published object
//! (currently only gates) so a remote core can find something it didn't
//! allocate itself.
//!
//! `xproc_kern::gate_registry` keys published gates by hardware lock index,
//! which is the right key for aliasing and lookup during `gate_open`, but
//! it is not a key a human (or a config file) can use to say "give me the
//! firmware-update gate". This crate sits in front of it with a small
//! fixed-capacity name -> descriptor table, the same bounded-map shape as
//! the rest of the substrate.

use fixedmap::FixedMap;
use xproc_abi::GateDescriptor;

/// Maximum length of a published name, including padding.
pub const NAME_LEN: usize = 16;

/// A fixed-width name, zero-padded, so it can be used as a `Copy` map key.
pub type Name = [u8; NAME_LEN];

/// Builds a [`Name`] from a `&str`, truncating or zero-padding as needed.
pub fn name(s: &str) -> Name {
    let mut buf = [0u8; NAME_LEN];
    let bytes = s.as_bytes();
    let len = bytes.len().min(NAME_LEN);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

/// A published object: for now always a gate, kept as an enum so other
/// object kinds can be added without widening every `NameTable` caller's
/// match arms unnecessarily.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Published {
    Gate(GateDescriptor),
}

/// A bounded table mapping names to published objects.
pub struct NameTable<const N: usize> {
    entries: FixedMap<Name, Published, N>,
}

impl<const N: usize> Default for NameTable<N> {
    fn default() -> Self {
        Self {
            entries: FixedMap::default(),
        }
    }
}

impl<const N: usize> NameTable<N> {
    /// Publishes `object` under `name`, replacing any previous entry with
    /// the same name.
    pub fn publish(&mut self, name: Name, object: Published) {
        self.entries.insert(name, object);
    }

    /// Looks up a previously published object by name.
    pub fn lookup(&self, name: &Name) -> Option<Published> {
        self.entries.get(*name)
    }

    /// Removes a published name, if present.
    pub fn unpublish(&mut self, name: &Name) {
        self.entries.remove(*name);
    }
}

impl<const N: usize> xproc_kern::gate_registry::NamePublisher for NameTable<N> {
    fn publish(&mut self, name: [u8; NAME_LEN], descriptor: GateDescriptor) {
        NameTable::publish(self, name, Published::Gate(descriptor));
    }

    fn lookup(&self, name: &[u8; NAME_LEN]) -> Option<GateDescriptor> {
        match NameTable::lookup(self, name) {
            Some(Published::Gate(descriptor)) => Some(descriptor),
            None => None,
        }
    }

    fn unpublish(&mut self, name: &[u8; NAME_LEN]) {
        NameTable::unpublish(self, name);
    }
}

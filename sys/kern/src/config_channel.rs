// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Config exchange channel: a singly linked list of typed blobs living in
//! shared memory.
//!
//! Either peer can append a new entry ([`write_config`], writing it into a
//! fresh region-0 allocation and splicing it onto the head of the pair's
//! list) or walk the chain looking for a particular [`ConfigKind`]
//! ([`find`]/[`find_kind`]/[`read_config`]). Writing a `None` blob for a
//! `(kind, remote, local)` that already has an entry removes it instead of
//! adding one -- there is no separate delete operation.

use crate::region::RegionTable;
use crate::restable::PhysAllocator;
use xproc_abi::{ConfigEntryHeader, ConfigKind, CoreId, Error, SharedPtr};
use zerocopy::{FromBytes, IntoBytes};

const MAX_CHAIN_WALK: usize = 64;

/// Walks the chain starting at `head`, calling `f` with each entry's header
/// and the region-resolved physical address of its payload, until `f`
/// returns `Some` or the chain ends.
///
/// Bounds the walk at [`MAX_CHAIN_WALK`] hops so a corrupted `next` pointer
/// that forms a cycle can't hang the caller; hitting the bound is reported
/// as [`Error::MalformedConfigChain`].
pub fn find<const N: usize, T>(
    regions: &RegionTable<N>,
    reader: &impl Fn(u64, u32, &mut [u8]) -> Result<(), Error>,
    mut head: SharedPtr,
    mut f: impl FnMut(&ConfigEntryHeader, u64) -> Option<T>,
) -> Result<T, Error> {
    let header_len = core::mem::size_of::<ConfigEntryHeader>() as u32;

    for _ in 0..MAX_CHAIN_WALK {
        if !head.is_valid() {
            return Err(Error::ConfigEntryNotFound);
        }
        let phys = regions.resolve(head, header_len)?;

        let mut buf = [0u8; core::mem::size_of::<ConfigEntryHeader>()];
        reader(phys, header_len, &mut buf)?;
        let header = ConfigEntryHeader::read_from_bytes(&buf)
            .map_err(|_| Error::MalformedConfigChain)?;

        if let Some(result) = f(&header, phys + u64::from(header_len)) {
            return Ok(result);
        }
        head = header.next;
    }
    Err(Error::MalformedConfigChain)
}

/// Convenience wrapper over [`find`] that looks for the first entry of
/// `kind` and returns the physical address of its payload plus its length.
pub fn find_kind<const N: usize>(
    regions: &RegionTable<N>,
    reader: &impl Fn(u64, u32, &mut [u8]) -> Result<(), Error>,
    head: SharedPtr,
    kind: ConfigKind,
) -> Result<(u64, u32), Error> {
    find(regions, reader, head, |header, payload_addr| {
        if header.kind == kind {
            Some((payload_addr, header.len))
        } else {
            None
        }
    })
}

/// Reads the payload of the first entry matching `(kind, remote, local)`
/// into `out`, failing with [`Error::ConfigSizeMismatch`] if `out`'s length
/// doesn't exactly match the entry's recorded length -- a caller that
/// doesn't know the payload's size in advance should read the length
/// returned by [`find`] first rather than guessing.
pub fn read_config<const N: usize>(
    regions: &RegionTable<N>,
    reader: &impl Fn(u64, u32, &mut [u8]) -> Result<(), Error>,
    head: SharedPtr,
    remote: CoreId,
    local: CoreId,
    kind: ConfigKind,
    out: &mut [u8],
) -> Result<(), Error> {
    let (addr, len) = find(regions, reader, head, |header, payload_addr| {
        if header.matches(kind, remote, local) {
            Some((payload_addr, header.len))
        } else {
            None
        }
    })?;
    if len as usize != out.len() {
        return Err(Error::ConfigSizeMismatch);
    }
    reader(addr, len, out)
}

/// Writes (or removes) a config entry for `(kind, remote, local)`.
///
/// `Some(blob)` allocates a fresh region-0 node, copies `blob` in after the
/// header, and prepends it onto `*head` -- the most recently written entry
/// for a given key is found first by [`find`], so repeated writes act like
/// an overriding push rather than requiring an explicit replace step.
/// `None` instead removes the first entry matching `(kind, remote, local)`,
/// patching its predecessor's `next` (or `*head` itself, if it was the
/// first entry) and releasing its allocation; removing a key with no entry
/// is a no-op.
#[allow(clippy::too_many_arguments)]
pub fn write_config<const N: usize>(
    regions: &RegionTable<N>,
    alloc: &mut impl PhysAllocator,
    reader: &impl Fn(u64, u32, &mut [u8]) -> Result<(), Error>,
    writer: &impl Fn(u64, &[u8]) -> Result<(), Error>,
    region_id: u16,
    head: &mut SharedPtr,
    remote: CoreId,
    local: CoreId,
    kind: ConfigKind,
    blob: Option<&[u8]>,
) -> Result<(), Error> {
    let Some(blob) = blob else {
        return unlink_first_match(regions, reader, writer, alloc, head, kind, remote, local);
    };

    let header_len = core::mem::size_of::<ConfigEntryHeader>() as u32;
    let total = header_len + blob.len() as u32;
    let phys = alloc.alloc(total, 1).ok_or(Error::AllocationFailed)?;

    let mut header = ConfigEntryHeader::new(kind, blob.len() as u32, remote, local);
    header.next = *head;
    writer(phys, header.as_bytes())?;
    writer(phys + u64::from(header_len), blob)?;

    *head = regions.to_shared_ptr(region_id, phys)?;
    Ok(())
}

/// Unlinks the first entry matching `(kind, remote, local)` from the chain
/// rooted at `*head`, if one exists.
fn unlink_first_match<const N: usize>(
    regions: &RegionTable<N>,
    reader: &impl Fn(u64, u32, &mut [u8]) -> Result<(), Error>,
    writer: &impl Fn(u64, &[u8]) -> Result<(), Error>,
    alloc: &mut impl PhysAllocator,
    head: &mut SharedPtr,
    kind: ConfigKind,
    remote: CoreId,
    local: CoreId,
) -> Result<(), Error> {
    let header_len = core::mem::size_of::<ConfigEntryHeader>() as u32;
    let mut prev_phys: Option<u64> = None;
    let mut cursor = *head;

    for _ in 0..MAX_CHAIN_WALK {
        if !cursor.is_valid() {
            return Ok(());
        }
        let phys = regions.resolve(cursor, header_len)?;
        let mut buf = [0u8; core::mem::size_of::<ConfigEntryHeader>()];
        reader(phys, header_len, &mut buf)?;
        let header = ConfigEntryHeader::read_from_bytes(&buf)
            .map_err(|_| Error::MalformedConfigChain)?;

        if header.matches(kind, remote, local) {
            match prev_phys {
                Some(prev_phys) => {
                    let mut prev_buf = [0u8; core::mem::size_of::<ConfigEntryHeader>()];
                    reader(prev_phys, header_len, &mut prev_buf)?;
                    let mut prev_header = ConfigEntryHeader::read_from_bytes(&prev_buf)
                        .map_err(|_| Error::MalformedConfigChain)?;
                    prev_header.next = header.next;
                    writer(prev_phys, prev_header.as_bytes())?;
                }
                None => *head = header.next,
            }
            alloc.free(phys, header_len + header.len);
            return Ok(());
        }
        prev_phys = Some(phys);
        cursor = header.next;
    }
    Err(Error::MalformedConfigChain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionTable;
    use std::cell::RefCell;
    use xproc_abi::RegionAttributes;

    struct FakeMemory {
        bytes: RefCell<std::vec::Vec<u8>>,
        base: u64,
    }

    impl FakeMemory {
        fn reader(&self) -> impl Fn(u64, u32, &mut [u8]) -> Result<(), Error> + '_ {
            move |phys, len, out| {
                let offset = (phys - self.base) as usize;
                out.copy_from_slice(&self.bytes.borrow()[offset..offset + len as usize]);
                Ok(())
            }
        }

        fn writer(&self) -> impl Fn(u64, &[u8]) -> Result<(), Error> + '_ {
            move |phys, bytes| {
                let offset = (phys - self.base) as usize;
                let mut storage = self.bytes.borrow_mut();
                if storage.len() < offset + bytes.len() {
                    storage.resize(offset + bytes.len(), 0);
                }
                storage[offset..offset + bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
        }

        fn append(&self, kind: ConfigKind, payload: &[u8]) -> SharedPtr {
            let mut bytes = self.bytes.borrow_mut();
            let offset = bytes.len() as u32;
            let mut header =
                ConfigEntryHeader::new(kind, payload.len() as u32, CoreId(1), CoreId::HOST);
            // link the previous head (if any) is caller's job; for these
            // tests each append happens once at the tail.
            header.next = xproc_abi::CONFIG_LIST_END;
            bytes.extend_from_slice(header.as_bytes());
            bytes.extend_from_slice(payload);
            SharedPtr::new(0, offset)
        }
    }

    /// A bump allocator over the same byte vector `FakeMemory` writes
    /// through, so `write_config`'s allocation and its `writer` calls land
    /// in the same backing store.
    struct BumpAllocator {
        next: u64,
    }

    impl PhysAllocator for BumpAllocator {
        fn alloc(&mut self, len: u32, _align: u32) -> Option<u64> {
            let addr = self.next;
            self.next += u64::from(len);
            Some(addr)
        }
    }

    fn make_regions(mem: &FakeMemory, len: u32) -> RegionTable<4> {
        let mut regions: RegionTable<4> = RegionTable::default();
        regions
            .register(
                0,
                xproc_abi::RegionEntry::new(mem.base, len, RegionAttributes::READ | RegionAttributes::WRITE),
            )
            .unwrap();
        regions
    }

    #[test]
    fn finds_matching_kind_in_single_entry_chain() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let head = mem.append(ConfigKind::CLOCK_RATE, &[1, 2, 3, 4]);
        let regions = make_regions(&mem, 256);

        let (addr, len) = find_kind(&regions, &mem.reader(), head, ConfigKind::CLOCK_RATE).unwrap();
        assert_eq!(len, 4);
        assert_eq!(addr, mem.base + core::mem::size_of::<ConfigEntryHeader>() as u64);
    }

    #[test]
    fn missing_kind_is_not_found() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let head = mem.append(ConfigKind::CLOCK_RATE, &[0; 4]);
        let regions = make_regions(&mem, 256);

        assert_eq!(
            find_kind(&regions, &mem.reader(), head, ConfigKind::TRACE_LEVEL).unwrap_err(),
            Error::ConfigEntryNotFound
        );
    }

    #[test]
    fn empty_chain_head_is_not_found() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let regions = make_regions(&mem, 256);
        assert_eq!(
            find_kind(&regions, &mem.reader(), xproc_abi::CONFIG_LIST_END, ConfigKind::CLOCK_RATE)
                .unwrap_err(),
            Error::ConfigEntryNotFound
        );
    }

    #[test]
    fn write_then_read_round_trips() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let regions = make_regions(&mem, 4096);
        let mut alloc = BumpAllocator { next: mem.base };
        let remote = CoreId(1);
        let local = CoreId::HOST;
        let payload: [u8; 16] = core::array::from_fn(|i| i as u8);

        let mut head = xproc_abi::CONFIG_LIST_END;
        write_config(
            &regions,
            &mut alloc,
            &mem.reader(),
            &mem.writer(),
            0,
            &mut head,
            remote,
            local,
            ConfigKind::FEATURE_FLAGS,
            Some(&payload),
        )
        .unwrap();

        let mut out = [0u8; 16];
        read_config(
            &regions,
            &mem.reader(),
            head,
            remote,
            local,
            ConfigKind::FEATURE_FLAGS,
            &mut out,
        )
        .unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn write_prepends_keeping_the_older_entry_reachable() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let regions = make_regions(&mem, 4096);
        let mut alloc = BumpAllocator { next: mem.base };
        let remote = CoreId(1);
        let local = CoreId::HOST;

        let mut head = xproc_abi::CONFIG_LIST_END;
        write_config(
            &regions, &mut alloc, &mem.reader(), &mem.writer(), 0, &mut head,
            remote, local, ConfigKind::CLOCK_RATE, Some(&[1]),
        )
        .unwrap();
        write_config(
            &regions, &mut alloc, &mem.reader(), &mem.writer(), 0, &mut head,
            remote, local, ConfigKind::TRACE_LEVEL, Some(&[2]),
        )
        .unwrap();

        let mut out = [0u8; 1];
        read_config(&regions, &mem.reader(), head, remote, local, ConfigKind::CLOCK_RATE, &mut out).unwrap();
        assert_eq!(out, [1]);
        read_config(&regions, &mem.reader(), head, remote, local, ConfigKind::TRACE_LEVEL, &mut out).unwrap();
        assert_eq!(out, [2]);
    }

    #[test]
    fn null_blob_removes_the_entry() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let regions = make_regions(&mem, 4096);
        let mut alloc = BumpAllocator { next: mem.base };
        let remote = CoreId(1);
        let local = CoreId::HOST;

        let mut head = xproc_abi::CONFIG_LIST_END;
        write_config(
            &regions, &mut alloc, &mem.reader(), &mem.writer(), 0, &mut head,
            remote, local, ConfigKind::CLOCK_RATE, Some(&[9]),
        )
        .unwrap();
        write_config(
            &regions, &mut alloc, &mem.reader(), &mem.writer(), 0, &mut head,
            remote, local, ConfigKind::CLOCK_RATE, None,
        )
        .unwrap();

        let mut out = [0u8; 1];
        assert_eq!(
            read_config(&regions, &mem.reader(), head, remote, local, ConfigKind::CLOCK_RATE, &mut out)
                .unwrap_err(),
            Error::ConfigEntryNotFound
        );
    }

    #[test]
    fn size_mismatch_is_reported() {
        let mem = FakeMemory {
            bytes: RefCell::new(std::vec::Vec::new()),
            base: 0x9000_0000,
        };
        let regions = make_regions(&mem, 4096);
        let mut alloc = BumpAllocator { next: mem.base };
        let remote = CoreId(1);
        let local = CoreId::HOST;

        let mut head = xproc_abi::CONFIG_LIST_END;
        write_config(
            &regions, &mut alloc, &mem.reader(), &mem.writer(), 0, &mut head,
            remote, local, ConfigKind::CLOCK_RATE, Some(&[1, 2, 3, 4]),
        )
        .unwrap();

        let mut out = [0u8; 2];
        assert_eq!(
            read_config(&regions, &mem.reader(), head, remote, local, ConfigKind::CLOCK_RATE, &mut out)
                .unwrap_err(),
            Error::ConfigSizeMismatch
        );
    }
}
